// Copyright (c) 2024-present, cask-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    file_io::{FileIo, StdFileIo},
    record::{self, LogRecord, RecordPosition, MAX_HEADER_LEN},
};
use std::path::{Path, PathBuf};

/// Suffix of segment files.
pub const DATA_FILE_SUFFIX: &str = ".data";

/// Name of the hint file written by a merge.
pub const HINT_FILE_NAME: &str = "hint-index";

/// Name of the merge commit marker file.
pub const MERGE_FINISHED_FILE_NAME: &str = "merge_finished";

/// Returns the path of the segment file with the given ID.
pub fn data_file_path<P: AsRef<Path>>(dir: P, fid: u32) -> PathBuf {
    dir.as_ref().join(format!("{fid:09}{DATA_FILE_SUFFIX}"))
}

/// One append-only segment of the log.
///
/// Bytes `[0, write_offset)` form a sequence of valid encoded records; the
/// file grows only by appending. At most one segment per engine is active,
/// all others are immutable.
#[allow(clippy::module_name_repetitions)]
pub struct DataFile {
    /// Segment file ID
    pub fid: u32,

    /// Offset of the next append (only meaningful for the active segment)
    pub write_offset: u64,

    io: Box<dyn FileIo>,
}

impl DataFile {
    /// Opens (or creates) the segment `<fid as 9 digits>.data` in `dir`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn open<P: AsRef<Path>>(dir: P, fid: u32) -> crate::Result<Self> {
        Self::open_at(data_file_path(dir, fid), fid)
    }

    /// Opens (or creates) the hint file in `dir`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn hint_file<P: AsRef<Path>>(dir: P) -> crate::Result<Self> {
        Self::open_at(dir.as_ref().join(HINT_FILE_NAME), 0)
    }

    /// Opens (or creates) the merge commit marker file in `dir`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn merge_finished_file<P: AsRef<Path>>(dir: P) -> crate::Result<Self> {
        Self::open_at(dir.as_ref().join(MERGE_FINISHED_FILE_NAME), 0)
    }

    fn open_at(path: PathBuf, fid: u32) -> crate::Result<Self> {
        let io = StdFileIo::open(path)?;

        Ok(Self {
            fid,
            write_offset: 0,
            io: Box::new(io),
        })
    }

    /// Appends `buf` and advances the write offset.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn write(&mut self, buf: &[u8]) -> crate::Result<()> {
        let n = self.io.append(buf)?;
        self.write_offset += n as u64;
        Ok(())
    }

    /// Appends a hint record mapping `key` to `pos`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn write_hint_record(&mut self, key: &[u8], pos: RecordPosition) -> crate::Result<()> {
        let record = LogRecord {
            key: key.to_vec(),
            value: pos.encode()?,
            record_type: record::RecordType::Normal,
        };
        self.write(&record.encode()?)
    }

    /// Reads the record starting at `offset`.
    ///
    /// Returns the record and the total number of bytes it occupies, or
    /// `None` at the end of the written region (either the physical end of
    /// the file or an all-zero header marking trailing unwritten space).
    ///
    /// # Errors
    ///
    /// Will return `Err` with [`crate::Error::InvalidCrc`] if the stored
    /// checksum does not match; IO errors pass through.
    pub fn read_log_record(&self, offset: u64) -> crate::Result<Option<(LogRecord, u64)>> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Ok(None);
        }

        let mut header_len = MAX_HEADER_LEN as u64;
        if offset + header_len > file_size {
            header_len = file_size - offset;
        }

        // NOTE: Truncation is fine, the header never exceeds 15 bytes
        #[allow(clippy::cast_possible_truncation)]
        let mut header_buf = vec![0u8; header_len as usize];
        self.io.read_at(&mut header_buf, offset)?;

        if header_buf.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let Some((header, header_size)) = record::decode_header(&header_buf)? else {
            return Ok(None);
        };

        if header.crc == 0 && header.key_len == 0 && header.val_len == 0 {
            return Ok(None);
        }

        let key_len = header.key_len as usize;
        let val_len = header.val_len as usize;

        let mut kv_buf = vec![0u8; key_len + val_len];
        if !kv_buf.is_empty() {
            self.io.read_at(&mut kv_buf, offset + header_size as u64)?;
        }

        let value = kv_buf.split_off(key_len);
        let key = kv_buf;

        let header_tail = header_buf
            .get(4..header_size)
            .expect("header tail was decoded from this buffer");

        if record::checksum(header_tail, &key, &value) != header.crc {
            return Err(crate::Error::InvalidCrc);
        }

        let record = LogRecord {
            key,
            value,
            record_type: header.record_type,
        };

        Ok(Some((record, (header_size + key_len + val_len) as u64)))
    }

    /// Flushes OS buffers to durable media.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn sync(&self) -> crate::Result<()> {
        Ok(self.io.sync()?)
    }
}
