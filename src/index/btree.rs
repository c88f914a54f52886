// Copyright (c) 2024-present, cask-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Index, IndexIterator};
use crate::record::RecordPosition;
use std::{collections::BTreeMap, sync::RwLock};

/// Ordered B-tree index.
#[allow(clippy::module_name_repetitions)]
#[derive(Default)]
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, RecordPosition>>,
}

impl Index for BTreeIndex {
    fn put(&self, key: Vec<u8>, pos: RecordPosition) -> bool {
        self.tree
            .write()
            .expect("lock is poisoned")
            .insert(key, pos);
        true
    }

    fn get(&self, key: &[u8]) -> Option<RecordPosition> {
        self.tree.read().expect("lock is poisoned").get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.tree
            .write()
            .expect("lock is poisoned")
            .remove(key)
            .is_some()
    }

    fn len(&self) -> usize {
        self.tree.read().expect("lock is poisoned").len()
    }

    fn iter(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let tree = self.tree.read().expect("lock is poisoned");

        let mut entries: Vec<(Vec<u8>, RecordPosition)> = tree
            .iter()
            .map(|(key, pos)| (key.clone(), *pos))
            .collect();

        if reverse {
            entries.reverse();
        }

        Box::new(BTreeIterator {
            entries,
            current: 0,
            reverse,
        })
    }
}

/// Snapshot cursor over a [`BTreeIndex`].
#[allow(clippy::module_name_repetitions)]
pub struct BTreeIterator {
    entries: Vec<(Vec<u8>, RecordPosition)>,
    current: usize,
    reverse: bool,
}

impl IndexIterator for BTreeIterator {
    fn rewind(&mut self) {
        self.current = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.current = if self.reverse {
            self.entries
                .partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.entries
                .partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    fn next(&mut self) {
        if self.current < self.entries.len() {
            self.current += 1;
        }
    }

    fn valid(&self) -> bool {
        self.current < self.entries.len()
    }

    fn key(&self) -> &[u8] {
        self.entries
            .get(self.current)
            .map(|(key, _)| key.as_slice())
            .expect("cursor should be valid")
    }

    fn value(&self) -> RecordPosition {
        self.entries
            .get(self.current)
            .map(|(_, pos)| *pos)
            .expect("cursor should be valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(fid: u32, offset: u64) -> RecordPosition {
        RecordPosition { fid, offset }
    }

    #[test]
    fn put_get_delete() {
        let index = BTreeIndex::default();

        assert!(index.put(b"a".to_vec(), pos(0, 0)));
        assert!(index.put(b"b".to_vec(), pos(0, 12)));
        assert_eq!(2, index.len());

        assert_eq!(Some(pos(0, 0)), index.get(b"a"));
        assert_eq!(None, index.get(b"missing"));

        // replace
        assert!(index.put(b"a".to_vec(), pos(1, 7)));
        assert_eq!(Some(pos(1, 7)), index.get(b"a"));
        assert_eq!(2, index.len());

        assert!(index.delete(b"a"));
        assert!(!index.delete(b"a"));
        assert_eq!(None, index.get(b"a"));
        assert_eq!(1, index.len());
    }

    #[test]
    fn iterator_is_ordered() {
        let index = BTreeIndex::default();
        for key in [b"c".to_vec(), b"a".to_vec(), b"b".to_vec()] {
            index.put(key, pos(0, 0));
        }

        let mut iter = index.iter(false);
        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()], keys);

        let mut iter = index.iter(true);
        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()], keys);
    }

    #[test]
    fn seek_lands_on_next_key() {
        let index = BTreeIndex::default();
        for key in [b"aa".to_vec(), b"cc".to_vec(), b"ee".to_vec()] {
            index.put(key, pos(0, 0));
        }

        let mut iter = index.iter(false);
        iter.seek(b"bb");
        assert!(iter.valid());
        assert_eq!(b"cc", iter.key());

        iter.seek(b"cc");
        assert_eq!(b"cc", iter.key());

        iter.seek(b"ff");
        assert!(!iter.valid());

        let mut iter = index.iter(true);
        iter.seek(b"dd");
        assert!(iter.valid());
        assert_eq!(b"cc", iter.key());

        iter.seek(b"a");
        assert!(!iter.valid());
    }

    #[test]
    fn cursor_is_a_snapshot() {
        let index = BTreeIndex::default();
        index.put(b"a".to_vec(), pos(0, 0));

        let mut iter = index.iter(false);
        index.put(b"b".to_vec(), pos(0, 30));
        index.delete(b"a");

        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(vec![b"a".to_vec()], keys);
    }
}
