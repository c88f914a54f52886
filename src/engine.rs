// Copyright (c) 2024-present, cask-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    config::Config,
    data_file::{DataFile, DATA_FILE_SUFFIX},
    index::{self, Index},
    merge,
    record::{self, LogRecord, RecordPosition, RecordType, NON_TXN_SEQ, TXN_FIN_KEY},
    value_cache::ValueCache,
    Error,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, RwLock,
    },
};

/// Records of one batch, buffered during replay until its commit marker
/// is seen.
type PendingBatch = Vec<(RecordType, Vec<u8>, RecordPosition)>;

/// Mutable engine state guarded by the engine lock: the active segment,
/// the immutable older segments and the closed flag.
pub(crate) struct EngineState {
    pub(crate) active: Option<DataFile>,
    pub(crate) older: HashMap<u32, Arc<DataFile>>,
    pub(crate) closed: bool,
}

impl EngineState {
    pub(crate) fn file_at(&self, fid: u32) -> Option<&DataFile> {
        match &self.active {
            Some(active) if active.fid == fid => Some(active),
            _ => self.older.get(&fid).map(Arc::as_ref),
        }
    }
}

/// A disk-resident key-value store.
///
/// One engine instance owns one data directory. All methods take `&self`;
/// the engine can be shared between threads.
pub struct Engine {
    pub(crate) path: PathBuf,
    pub(crate) config: Config,

    pub(crate) state: RwLock<EngineState>,

    /// In-memory key index
    pub(crate) index: Box<dyn Index>,

    /// Last allocated transaction sequence number
    pub(crate) seq_no: AtomicU64,

    /// In-memory value cache
    pub(crate) value_cache: ValueCache,

    pub(crate) merge_guard: Mutex<()>,
}

impl Engine {
    /// Creates or recovers a store in the given directory.
    ///
    /// A completed merge left behind by a previous instance is swapped in
    /// first, then the index is rebuilt from the hint file (if present)
    /// and a sequential replay of the segment files.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the configuration is invalid or an IO or
    /// decode error occurs during recovery.
    pub fn open<P: Into<PathBuf>>(path: P, config: Config) -> crate::Result<Self> {
        let path = path.into();

        if path.as_os_str().is_empty() {
            return Err(Error::DirPathEmpty);
        }
        if config.max_file_size == 0 {
            return Err(Error::MaxFileSizeInvalid);
        }

        std::fs::create_dir_all(&path)?;

        log::info!("Opening store at {}", path.display());

        let merge_fin_fid = merge::consume_completed_merge(&path)?;

        let fids = sorted_fids(&path)?;

        let mut state = EngineState {
            active: None,
            older: HashMap::new(),
            closed: false,
        };

        if let Some((&active_fid, older_fids)) = fids.split_last() {
            for &fid in older_fids {
                state.older.insert(fid, Arc::new(DataFile::open(&path, fid)?));
            }
            state.active = Some(DataFile::open(&path, active_fid)?);
        }

        let engine = Self {
            index: index::new_index(config.index_type),
            value_cache: ValueCache::with_capacity_bytes(config.value_cache_bytes),
            seq_no: AtomicU64::new(0),
            merge_guard: Mutex::new(()),
            state: RwLock::new(state),
            path,
            config,
        };

        let hint_loaded = engine.load_index_from_hint_file()?;

        // Segments below the merge boundary hold exactly the records the
        // hint file describes, so they only need replaying when the hint
        // was not consumed.
        let skip_below = if hint_loaded { merge_fin_fid } else { None };
        engine.load_index_from_data_files(&fids, skip_below)?;

        Ok(engine)
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty, the engine is closed or an
    /// IO error occurs.
    pub fn put(&self, key: &[u8], value: &[u8]) -> crate::Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        let record = LogRecord {
            key: record::key_with_seq(key, NON_TXN_SEQ),
            value: value.to_vec(),
            record_type: RecordType::Normal,
        };

        let mut state = self.state.write().expect("lock is poisoned");
        let pos = self.append_record_locked(&mut state, &record)?;

        if !self.index.put(key.to_vec(), pos) {
            return Err(Error::IndexUpdate);
        }

        Ok(())
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Will return `Err` with [`Error::KeyNotFound`] if no live record
    /// exists for the key.
    pub fn get(&self, key: &[u8]) -> crate::Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        let state = self.state.read().expect("lock is poisoned");
        if state.closed {
            return Err(Error::Closed);
        }

        let pos = self.index.get(key).ok_or(Error::KeyNotFound)?;
        self.read_value(&state, pos)
    }

    /// Removes `key`.
    ///
    /// Deleting an absent key is a no-op and succeeds without writing.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty, the engine is closed or an
    /// IO error occurs.
    pub fn delete(&self, key: &[u8]) -> crate::Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }

        let mut state = self.state.write().expect("lock is poisoned");
        if state.closed {
            return Err(Error::Closed);
        }

        if self.index.get(key).is_none() {
            return Ok(());
        }

        let record = LogRecord {
            key: record::key_with_seq(key, NON_TXN_SEQ),
            value: Vec::new(),
            record_type: RecordType::Deleted,
        };
        self.append_record_locked(&mut state, &record)?;

        if !self.index.delete(key) {
            return Err(Error::IndexUpdate);
        }

        Ok(())
    }

    /// Collects all live keys, in the configured scan direction.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the engine is closed.
    pub fn list_keys(&self) -> crate::Result<Vec<Vec<u8>>> {
        let state = self.state.read().expect("lock is poisoned");
        if state.closed {
            return Err(Error::Closed);
        }

        let mut iter = self.index.iter(self.config.reverse);
        let mut keys = Vec::with_capacity(self.index.len());

        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }

        Ok(keys)
    }

    /// Calls `f` for every live key-value pair, in the configured scan
    /// direction, until `f` returns `false`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the engine is closed or a read fails.
    pub fn fold<F>(&self, mut f: F) -> crate::Result<()>
    where
        F: FnMut(&[u8], Vec<u8>) -> bool,
    {
        let state = self.state.read().expect("lock is poisoned");
        if state.closed {
            return Err(Error::Closed);
        }

        let mut iter = self.index.iter(self.config.reverse);

        while iter.valid() {
            let value = self.read_value(&state, iter.value())?;
            if !f(iter.key(), value) {
                break;
            }
            iter.next();
        }

        Ok(())
    }

    /// Flushes the active segment to durable media.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the engine is closed or an IO error occurs.
    pub fn sync(&self) -> crate::Result<()> {
        let state = self.state.write().expect("lock is poisoned");
        if state.closed {
            return Err(Error::Closed);
        }

        if let Some(active) = &state.active {
            active.sync()?;
        }

        Ok(())
    }

    /// Flushes and closes all segments and marks the engine closed.
    ///
    /// Closing an already-closed engine succeeds. Subsequent operations
    /// fail with [`Error::Closed`].
    ///
    /// # Errors
    ///
    /// Will return `Err` if the final flush fails.
    pub fn close(&self) -> crate::Result<()> {
        let mut state = self.state.write().expect("lock is poisoned");
        if state.closed {
            return Ok(());
        }

        if let Some(active) = &state.active {
            active.sync()?;
        }

        state.active = None;
        state.older.clear();
        state.closed = true;

        Ok(())
    }

    /// Number of live keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.index.len()
    }

    /// Last transaction sequence number handed out.
    ///
    /// Advanced only by batch commits; recovered on open as the maximum
    /// sequence number observed anywhere in the log.
    #[must_use]
    pub fn sequence_number(&self) -> u64 {
        self.seq_no.load(Ordering::SeqCst)
    }

    /// Appends a record under a fresh hold of the engine write lock.
    pub(crate) fn append_record(&self, record: &LogRecord) -> crate::Result<RecordPosition> {
        let mut state = self.state.write().expect("lock is poisoned");
        self.append_record_locked(&mut state, record)
    }

    /// Appends a record to the active segment, rotating it out first if
    /// the encoded record would push it past the segment size limit.
    ///
    /// Callers hold the engine write lock.
    pub(crate) fn append_record_locked(
        &self,
        state: &mut EngineState,
        record: &LogRecord,
    ) -> crate::Result<RecordPosition> {
        if state.closed {
            return Err(Error::Closed);
        }

        if state.active.is_none() {
            state.active = Some(DataFile::open(&self.path, 0)?);
        }

        let encoded = record.encode()?;

        let needs_rotation = state
            .active
            .as_ref()
            .is_some_and(|active| active.write_offset + encoded.len() as u64 > self.config.max_file_size);

        if needs_rotation {
            state
                .active
                .as_ref()
                .expect("active segment was checked above")
                .sync()?;

            let old = state
                .active
                .take()
                .expect("active segment was checked above");
            let old_fid = old.fid;
            log::trace!("Rotating active segment {old_fid}");

            state.older.insert(old_fid, Arc::new(old));
            state.active = Some(DataFile::open(&self.path, old_fid + 1)?);
        }

        let active = state
            .active
            .as_mut()
            .expect("active segment was just opened");

        let offset = active.write_offset;
        active.write(&encoded)?;

        if self.config.sync_writes {
            active.sync()?;
        }

        Ok(RecordPosition {
            fid: active.fid,
            offset,
        })
    }

    /// Resolves a record position to its value, going through the value
    /// cache first.
    pub(crate) fn read_value(
        &self,
        state: &EngineState,
        pos: RecordPosition,
    ) -> crate::Result<Vec<u8>> {
        if let Some(value) = self.value_cache.get(&pos) {
            return Ok(value.to_vec());
        }

        let file = state.file_at(pos.fid).ok_or(Error::DataFileNotFound)?;

        let Some((record, _)) = file.read_log_record(pos.offset)? else {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "record offset past end of segment",
            )));
        };

        if record.record_type == RecordType::Deleted {
            return Err(Error::KeyNotFound);
        }

        let value: Arc<[u8]> = record.value.into();
        self.value_cache.insert(pos, value.clone());

        Ok(value.to_vec())
    }

    /// Rebuilds the index by replaying every segment in fid order.
    ///
    /// Batched records are buffered per sequence number and only applied
    /// once their commit marker is seen; a batch with no marker before the
    /// end of the log never committed and is discarded. Segments below
    /// `skip_below` are covered by the hint file and are not replayed.
    fn load_index_from_data_files(
        &self,
        fids: &[u32],
        skip_below: Option<u32>,
    ) -> crate::Result<()> {
        let Some(&active_fid) = fids.last() else {
            return Ok(());
        };

        let mut state = self.state.write().expect("lock is poisoned");
        let state = &mut *state;

        let mut pending: HashMap<u64, PendingBatch> = HashMap::new();
        let mut max_seq = 0u64;

        for &fid in fids {
            if skip_below.is_some_and(|fin_fid| fid < fin_fid) {
                log::debug!("Skipping merged segment {fid}");
                continue;
            }

            let file = if fid == active_fid {
                state
                    .active
                    .as_ref()
                    .ok_or(Error::DataFileNotFound)?
            } else {
                state
                    .older
                    .get(&fid)
                    .map(Arc::as_ref)
                    .ok_or(Error::DataFileNotFound)?
            };

            let mut offset = 0u64;

            while let Some((record, size)) = file.read_log_record(offset)? {
                let pos = RecordPosition { fid, offset };
                let (user_key, seq) = record::parse_record_key(&record.key)?;

                if record.record_type == RecordType::TxnFin && user_key == TXN_FIN_KEY {
                    if let Some(entries) = pending.remove(&seq) {
                        for (record_type, key, entry_pos) in entries {
                            self.apply_to_index(record_type, key, entry_pos)?;
                        }
                    }
                    max_seq = max_seq.max(seq);
                } else if seq == NON_TXN_SEQ {
                    self.apply_to_index(record.record_type, user_key, pos)?;
                } else {
                    // Orphaned sequence numbers still count towards the
                    // recovered counter so a later commit never reuses them.
                    max_seq = max_seq.max(seq);
                    pending
                        .entry(seq)
                        .or_default()
                        .push((record.record_type, user_key, pos));
                }

                offset += size;
            }

            if fid == active_fid {
                state
                    .active
                    .as_mut()
                    .ok_or(Error::DataFileNotFound)?
                    .write_offset = offset;
            }
        }

        self.seq_no.store(max_seq, Ordering::SeqCst);

        log::debug!(
            "Recovered {} keys, sequence number {max_seq}",
            self.index.len()
        );

        Ok(())
    }

    fn apply_to_index(
        &self,
        record_type: RecordType,
        key: Vec<u8>,
        pos: RecordPosition,
    ) -> crate::Result<()> {
        match record_type {
            RecordType::Normal => {
                if !self.index.put(key, pos) {
                    return Err(Error::IndexUpdate);
                }
            }
            RecordType::Deleted => {
                // a tombstone for an absent key is normal during replay
                self.index.delete(&key);
            }
            RecordType::TxnFin => {}
        }

        Ok(())
    }
}

/// Scans the data directory for segment files and returns their IDs in
/// ascending order.
fn sorted_fids(path: &Path) -> crate::Result<Vec<u32>> {
    let mut fids = Vec::new();

    for dirent in std::fs::read_dir(path)? {
        let dirent = dirent?;
        let file_name = dirent.file_name();
        let name = file_name.to_string_lossy();

        if let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) {
            let fid = stem
                .parse::<u32>()
                .map_err(|_| Error::DataFileCorrupted)?;
            fids.push(fid);
        }
    }

    fids.sort_unstable();
    Ok(fids)
}
