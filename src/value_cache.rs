use crate::record::RecordPosition;
use quick_cache::{sync::Cache, Weighter};
use std::sync::Arc;

type Item = Arc<[u8]>;

#[derive(Clone)]
struct ValueWeighter;

impl Weighter<RecordPosition, Item> for ValueWeighter {
    // NOTE: quick_cache only supports u32 as weight, but that's fine
    // 4 GB values are too big anyway
    #[allow(clippy::cast_possible_truncation)]
    fn weight(&self, _: &RecordPosition, value: &Item) -> u32 {
        value.len() as u32
    }
}

/// Value cache, in which recently read values are kept in memory.
///
/// Record positions never change for the lifetime of an engine instance
/// (a merge only rebinds positions at the next open), so entries never
/// need invalidation.
pub struct ValueCache {
    data: Cache<RecordPosition, Item, ValueWeighter>,
    capacity: u64,
}

impl std::fmt::Debug for ValueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ValueCache<cap: {} bytes>", self.capacity)
    }
}

impl ValueCache {
    /// Creates a new value cache with roughly `bytes` of capacity.
    #[must_use]
    pub fn with_capacity_bytes(bytes: u64) -> Self {
        Self {
            data: Cache::with_weighter(10_000, bytes, ValueWeighter),
            capacity: bytes,
        }
    }

    pub(crate) fn insert(&self, pos: RecordPosition, value: Item) {
        if self.capacity > 0 {
            self.data.insert(pos, value);
        }
    }

    pub(crate) fn get(&self, pos: &RecordPosition) -> Option<Item> {
        if self.capacity > 0 {
            self.data.get(pos)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let cache = ValueCache::with_capacity_bytes(1_024);
        let pos = RecordPosition { fid: 0, offset: 0 };

        assert!(cache.get(&pos).is_none());
        cache.insert(pos, b"value".to_vec().into());
        assert_eq!(b"value".as_slice(), &*cache.get(&pos).expect("cached"));
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = ValueCache::with_capacity_bytes(0);
        let pos = RecordPosition { fid: 0, offset: 0 };

        cache.insert(pos, b"value".to_vec().into());
        assert!(cache.get(&pos).is_none());
    }
}
