// Copyright (c) 2024-present, cask-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Represents errors that can occur in the store
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Caller supplied an empty key where one is required
    KeyEmpty,

    /// No live record exists for the key
    KeyNotFound,

    /// The index referenced a segment that is not in memory
    DataFileNotFound,

    /// The index rejected a put or delete
    IndexUpdate,

    /// The data directory path is empty
    DirPathEmpty,

    /// The segment size limit is not positive
    MaxFileSizeInvalid,

    /// A file in the data directory has an unparseable segment name
    DataFileCorrupted,

    /// Record checksum mismatch
    InvalidCrc,

    /// The batch holds more distinct keys than its configured maximum
    ExceedMaxBatchSize,

    /// Another merge is already running
    MergeInProgress,

    /// Operation attempted on a closed engine
    Closed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CaskError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Store result
pub type Result<T> = std::result::Result<T, Error>;
