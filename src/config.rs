// Copyright (c) 2024-present, cask-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::index::IndexType;

/// Engine configuration
#[derive(Clone)]
pub struct Config {
    /// Segment size limit in bytes
    pub(crate) max_file_size: u64,

    /// Whether every write syncs the active segment before returning
    pub(crate) sync_writes: bool,

    /// Index implementation to use
    pub(crate) index_type: IndexType,

    /// Default scan direction for [`crate::Engine::list_keys`] and
    /// [`crate::Engine::fold`]
    pub(crate) reverse: bool,

    /// Default iterator options
    pub(crate) iterator: IteratorOptions,

    /// Value cache capacity in bytes (0 disables caching)
    pub(crate) value_cache_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: 256 * 1_024 * 1_024,
            sync_writes: false,
            index_type: IndexType::BTree,
            reverse: false,
            iterator: IteratorOptions::default(),
            value_cache_bytes: 16 * 1_024 * 1_024,
        }
    }
}

impl Config {
    /// Sets the maximum size of segment files.
    ///
    /// Once the active segment would grow past this limit it is rotated
    /// out and a fresh segment becomes active. Smaller segments give the
    /// merge finer granularity at the cost of more open files.
    ///
    /// Default = 256 MiB
    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Sets whether every single write is fsynced before returning.
    ///
    /// Turning this on trades throughput for durability of each
    /// individual write.
    ///
    /// Default = false
    #[must_use]
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Sets the index implementation.
    ///
    /// Default = [`IndexType::BTree`]
    #[must_use]
    pub fn index_type(mut self, index_type: IndexType) -> Self {
        self.index_type = index_type;
        self
    }

    /// Sets the default scan direction for [`crate::Engine::list_keys`]
    /// and [`crate::Engine::fold`].
    ///
    /// Default = false (ascending)
    #[must_use]
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Sets the default iterator options used by
    /// [`crate::Engine::iterator`].
    #[must_use]
    pub fn iterator_options(mut self, options: IteratorOptions) -> Self {
        self.iterator = options;
        self
    }

    /// Sets the value cache capacity in bytes.
    ///
    /// Recently read values are kept in memory to avoid repeated disk
    /// accesses for hot keys. 0 disables the cache.
    ///
    /// Default = 16 MiB
    #[must_use]
    pub fn value_cache_bytes(mut self, bytes: u64) -> Self {
        self.value_cache_bytes = bytes;
        self
    }
}

/// Iterator configuration
#[derive(Clone, Debug, Default)]
pub struct IteratorOptions {
    /// Only yield keys starting with this prefix (empty = no filter)
    pub prefix: Vec<u8>,

    /// Scan in descending key order
    pub reverse: bool,
}

/// Write batch configuration
#[derive(Clone, Copy, Debug)]
pub struct WriteBatchOptions {
    /// Cap on the number of distinct staged keys
    pub max_batch_size: usize,

    /// Whether commit syncs the active segment after the commit marker
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 10_000,
            sync_writes: true,
        }
    }
}
