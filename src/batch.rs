// Copyright (c) 2024-present, cask-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    config::WriteBatchOptions,
    engine::Engine,
    record::{self, LogRecord, RecordPosition, RecordType, TXN_FIN_KEY},
    Error,
};
use std::{
    collections::HashMap,
    sync::{atomic::Ordering, Mutex},
};

/// Staged atomic multi-key write.
///
/// Puts and deletes are buffered in memory, keyed by user key (the last
/// intent for a key wins), and become visible all at once on
/// [`WriteBatch::commit`]. A crash between the first record append and the
/// commit marker rolls the whole batch back on recovery.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    pending: Mutex<HashMap<Vec<u8>, LogRecord>>,
}

impl Engine {
    /// Creates a new write batch against this engine.
    #[must_use]
    pub fn write_batch(&self, options: WriteBatchOptions) -> WriteBatch<'_> {
        WriteBatch {
            engine: self,
            options,
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl WriteBatch<'_> {
    /// Stages a put.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty or the batch already holds
    /// the configured maximum of distinct keys.
    pub fn put(&self, key: &[u8], value: &[u8]) -> crate::Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        let mut pending = self.pending.lock().expect("lock is poisoned");

        if pending.len() >= self.options.max_batch_size {
            return Err(Error::ExceedMaxBatchSize);
        }

        pending.insert(
            key.to_vec(),
            LogRecord {
                key: key.to_vec(),
                value: value.to_vec(),
                record_type: RecordType::Normal,
            },
        );

        Ok(())
    }

    /// Stages a delete.
    ///
    /// Deleting a key that is neither live in the engine nor staged in
    /// this batch is a no-op; deleting a key that is only staged removes
    /// the staged intent instead of writing a tombstone.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty.
    pub fn delete(&self, key: &[u8]) -> crate::Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        let mut pending = self.pending.lock().expect("lock is poisoned");

        if self.engine.index.get(key).is_none() {
            pending.remove(key);
            return Ok(());
        }

        pending.insert(
            key.to_vec(),
            LogRecord {
                key: key.to_vec(),
                value: Vec::new(),
                record_type: RecordType::Deleted,
            },
        );

        Ok(())
    }

    /// Commits all staged intents atomically.
    ///
    /// The staged records share a fresh transaction sequence number and
    /// are followed by a commit marker; only once the marker is written
    /// (and synced, when configured) does the index publish the batch.
    /// Committing an empty batch succeeds without writing.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the engine is closed or an IO error occurs.
    pub fn commit(&self) -> crate::Result<()> {
        let mut pending = self.pending.lock().expect("lock is poisoned");
        if pending.is_empty() {
            return Ok(());
        }

        let mut state = self.engine.state.write().expect("lock is poisoned");
        if state.closed {
            return Err(Error::Closed);
        }

        let seq = self.engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut positions: HashMap<Vec<u8>, RecordPosition> =
            HashMap::with_capacity(pending.len());

        for (key, staged) in pending.iter() {
            let pos = self.engine.append_record_locked(
                &mut state,
                &LogRecord {
                    key: record::key_with_seq(key, seq),
                    value: staged.value.clone(),
                    record_type: staged.record_type,
                },
            )?;
            positions.insert(key.clone(), pos);
        }

        let marker = LogRecord {
            key: record::key_with_seq(TXN_FIN_KEY, seq),
            value: Vec::new(),
            record_type: RecordType::TxnFin,
        };
        self.engine.append_record_locked(&mut state, &marker)?;

        if self.options.sync_writes {
            if let Some(active) = &state.active {
                active.sync()?;
            }
        }

        for (key, staged) in pending.iter() {
            match staged.record_type {
                RecordType::Normal => {
                    let pos = positions
                        .get(key)
                        .expect("a position was recorded for every staged key");
                    if !self.engine.index.put(key.clone(), *pos) {
                        return Err(Error::IndexUpdate);
                    }
                }
                RecordType::Deleted => {
                    if !self.engine.index.delete(key) {
                        return Err(Error::IndexUpdate);
                    }
                }
                RecordType::TxnFin => {}
            }
        }

        pending.clear();

        Ok(())
    }
}
