// Copyright (c) 2024-present, cask-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    data_file::{self, DataFile, MERGE_FINISHED_FILE_NAME},
    engine::Engine,
    record::{self, LogRecord, RecordPosition, RecordType, NON_TXN_SEQ},
    Error,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Suffix of the transient merge directory, appended to the data
/// directory's name.
const MERGE_DIR_SUFFIX: &str = "-merge";

/// Key of the record stored in the merge commit marker file.
const MERGE_FIN_KEY: &[u8] = b"merge_finished";

/// Returns the sibling merge directory for a data directory.
fn merge_path_of(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    parent.join(format!("{base}{MERGE_DIR_SUFFIX}"))
}

impl Engine {
    /// Compacts all immutable segments into a fresh set containing only
    /// live records.
    ///
    /// The merge runs against a snapshot of the immutable segments while
    /// the engine keeps accepting writes. Its output lands in a sibling
    /// `-merge` directory together with a hint file; writing the
    /// `merge_finished` marker commits the merge, and the next
    /// [`Engine::open`] swaps the compacted segments in.
    ///
    /// # Errors
    ///
    /// Will return `Err` with [`Error::MergeInProgress`] if another merge
    /// is running, or if an IO error occurs.
    pub fn merge(&self) -> crate::Result<()> {
        // Only allow 1 merge at any given time
        let Ok(_guard) = self.merge_guard.try_lock() else {
            return Err(Error::MergeInProgress);
        };

        let (fin_fid, mut inputs) = {
            let mut state = self.state.write().expect("lock is poisoned");
            if state.closed {
                return Err(Error::Closed);
            }
            if state.active.is_none() {
                return Ok(());
            }

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

            state.older.insert(old_fid, Arc::new(old));
            state.active = Some(DataFile::open(&self.path, old_fid + 1)?);

            let inputs: Vec<Arc<DataFile>> = state.older.values().cloned().collect();

            (old_fid + 1, inputs)
        };

        inputs.sort_by_key(|file| file.fid);

        log::info!(
            "Merging {} segments below fid {fin_fid}",
            inputs.len()
        );

        let merge_path = merge_path_of(&self.path);
        if merge_path.try_exists()? {
            std::fs::remove_dir_all(&merge_path)?;
        }
        std::fs::create_dir_all(&merge_path)?;

        let mut scratch_config = self.config.clone();
        scratch_config.sync_writes = false;

        let scratch = Self::open(&merge_path, scratch_config)?;
        let mut hint_file = DataFile::hint_file(&merge_path)?;

        let mut live = 0u64;

        for file in &inputs {
            let mut offset = 0u64;

            while let Some((rec, size)) = file.read_log_record(offset)? {
                let (user_key, _) = record::parse_record_key(&rec.key)?;

                // A record is live iff the index still points at exactly
                // this position; everything else is stale and dropped.
                let is_live = self
                    .index
                    .get(&user_key)
                    .is_some_and(|pos| pos.fid == file.fid && pos.offset == offset);

                if is_live {
                    let rewritten = LogRecord {
                        key: record::key_with_seq(&user_key, NON_TXN_SEQ),
                        value: rec.value,
                        record_type: rec.record_type,
                    };
                    let new_pos = scratch.append_record(&rewritten)?;
                    hint_file.write_hint_record(&user_key, new_pos)?;
                    live += 1;
                }

                offset += size;
            }
        }

        hint_file.sync()?;
        scratch.sync()?;
        scratch.close()?;

        let mut fin_file = DataFile::merge_finished_file(&merge_path)?;
        let fin_record = LogRecord {
            key: MERGE_FIN_KEY.to_vec(),
            value: fin_fid.to_string().into_bytes(),
            record_type: RecordType::Normal,
        };
        fin_file.write(&fin_record.encode()?)?;
        fin_file.sync()?;

        log::info!("Merge finished, rewrote {live} live records");

        Ok(())
    }

    /// Loads hint records (key to position in the merged segments)
    /// straight into the index. Returns whether a hint file was consumed.
    pub(crate) fn load_index_from_hint_file(&self) -> crate::Result<bool> {
        let hint_path = self.path.join(data_file::HINT_FILE_NAME);
        if !hint_path.try_exists()? {
            return Ok(false);
        }

        let hint_file = DataFile::hint_file(&self.path)?;
        let mut offset = 0u64;
        let mut loaded = 0usize;

        while let Some((rec, size)) = hint_file.read_log_record(offset)? {
            let pos = RecordPosition::decode(&rec.value)?;
            if !self.index.put(rec.key, pos) {
                return Err(Error::IndexUpdate);
            }
            loaded += 1;
            offset += size;
        }

        log::debug!("Loaded {loaded} index entries from hint file");

        Ok(true)
    }
}

/// Swaps a completed merge into the data directory.
///
/// If the merge directory holds a `merge_finished` marker, the segments
/// it replaced (fid < `fin_fid`) are deleted from the data directory, the
/// compacted segments and the hint file are moved in, and the merge
/// directory is removed. An unfinished merge is discarded wholesale.
///
/// Returns the first unmerged fid of a consumed merge, if any.
pub(crate) fn consume_completed_merge(path: &Path) -> crate::Result<Option<u32>> {
    let merge_path = merge_path_of(path);
    if !merge_path.try_exists()? {
        return Ok(None);
    }

    let mut finished = false;
    let mut file_names = Vec::new();

    for dirent in std::fs::read_dir(&merge_path)? {
        let name = dirent?.file_name();
        if name.to_string_lossy() == MERGE_FINISHED_FILE_NAME {
            finished = true;
        } else {
            file_names.push(name);
        }
    }

    if !finished {
        log::warn!(
            "Discarding unfinished merge at {}",
            merge_path.display()
        );
        std::fs::remove_dir_all(&merge_path)?;
        return Ok(None);
    }

    let fin_fid = read_merge_fin_fid(&merge_path)?;

    log::info!("Consuming completed merge, first unmerged fid {fin_fid}");

    // fin_fid itself is the first unmerged segment and must survive
    for fid in 0..fin_fid {
        let segment = data_file::data_file_path(path, fid);
        if segment.try_exists()? {
            std::fs::remove_file(segment)?;
        }
    }

    for name in file_names {
        std::fs::rename(merge_path.join(&name), path.join(&name))?;
    }

    std::fs::remove_dir_all(&merge_path)?;

    Ok(Some(fin_fid))
}

/// Reads the first unmerged fid out of the merge commit marker.
fn read_merge_fin_fid(merge_path: &Path) -> crate::Result<u32> {
    let fin_file = DataFile::merge_finished_file(merge_path)?;

    let Some((rec, _)) = fin_file.read_log_record(0)? else {
        return Err(Error::DataFileCorrupted);
    };

    std::str::from_utf8(&rec.value)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .ok_or(Error::DataFileCorrupted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data_file::HINT_FILE_NAME, Config};

    fn small_config() -> Config {
        Config::default().max_file_size(512)
    }

    #[test]
    fn merge_path_is_a_sibling() {
        assert_eq!(
            PathBuf::from("/tmp/store-merge"),
            merge_path_of(Path::new("/tmp/store"))
        );
    }

    #[test]
    fn concurrent_merge_is_rejected() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = Engine::open(dir.path(), small_config())?;
        engine.put(b"k", b"v")?;

        let _guard = engine.merge_guard.lock().expect("lock is poisoned");
        assert!(matches!(engine.merge(), Err(Error::MergeInProgress)));

        Ok(())
    }

    #[test]
    fn merge_on_empty_engine_is_a_no_op() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = Engine::open(dir.path(), small_config())?;

        engine.merge()?;
        assert!(!merge_path_of(dir.path()).try_exists()?);

        Ok(())
    }

    #[test]
    fn hint_file_covers_every_live_key() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let data_path = dir.path().join("store");

        {
            let engine = Engine::open(&data_path, small_config())?;
            for round in 0..50u32 {
                for key in 0..10u32 {
                    engine.put(
                        format!("key-{key}").as_bytes(),
                        format!("value-{round}").as_bytes(),
                    )?;
                }
            }
            engine.merge()?;
        }

        // the merge directory holds the compacted output plus the hint
        // file; one hint record per live key
        let merge_path = merge_path_of(&data_path);
        let hint_file = DataFile::hint_file(&merge_path)?;

        let mut offset = 0u64;
        let mut keys = Vec::new();
        while let Some((rec, size)) = hint_file.read_log_record(offset)? {
            RecordPosition::decode(&rec.value)?;
            keys.push(rec.key);
            offset += size;
        }

        keys.sort();
        let expected: Vec<Vec<u8>> = {
            let mut keys: Vec<Vec<u8>> = (0..10u32)
                .map(|key| format!("key-{key}").into_bytes())
                .collect();
            keys.sort();
            keys
        };
        assert_eq!(expected, keys);

        // swapping the merge in loads the index straight from the hint
        let engine = Engine::open(&data_path, small_config())?;
        assert_eq!(10, engine.key_count());
        assert!(data_path.join(HINT_FILE_NAME).try_exists()?);
        assert!(!merge_path.try_exists()?);

        for key in 0..10u32 {
            assert_eq!(
                b"value-49".to_vec(),
                engine.get(format!("key-{key}").as_bytes())?
            );
        }

        Ok(())
    }

    #[test]
    fn unfinished_merge_is_discarded() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let data_path = dir.path().join("store");

        {
            let engine = Engine::open(&data_path, small_config())?;
            engine.put(b"k", b"v")?;
        }

        // a merge directory without the commit marker
        let merge_path = merge_path_of(&data_path);
        std::fs::create_dir_all(&merge_path)?;
        std::fs::write(merge_path.join("000000000.data"), b"half-written")?;

        let engine = Engine::open(&data_path, small_config())?;
        assert_eq!(b"v".to_vec(), engine.get(b"k")?);
        assert!(!merge_path.try_exists()?);

        Ok(())
    }
}
