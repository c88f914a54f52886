//! Embedded, persistent key-value store based on the Bitcask model.
//!
//! All writes are appended to an immutable log split into segment files;
//! an in-memory index maps each key to the position of its most recent
//! record on disk:
//!
//! [rec 0][rec 1][rec 2] ... | [rec n][rec n+1] ...
//! `000000000.data`          | `000000001.data` (active)
//!
//! Every record carries a CRC-32 header:
//!
//! \<crc: u32 LE\> \<type: u8\> \<varint key len\> \<varint value len\> \<key\> \<value\>
//!
//! Point reads resolve the key through the index and perform one random
//! read at the stored offset. Deletes append a tombstone record and drop
//! the index entry. Because old versions and tombstones accumulate in the
//! log, space is reclaimed by [`Engine::merge`], which rewrites only the
//! records still reachable through the live index and leaves behind a hint
//! file so the next [`Engine::open`] can rebuild the index without
//! replaying the compacted segments.
//!
//! [`WriteBatch`] stages multiple puts and deletes and commits them
//! atomically: the batch's records share a transaction sequence number and
//! only become visible once the terminating commit marker is durable, so a
//! crash mid-commit rolls the whole batch back on recovery.
//!
//! Use this crate when:
//! - you need an embedded store with fast point reads and writes
//! - your working set of *keys* fits in memory (values need not)
//! - your access pattern is point read/write heavy, with occasional ordered
//!   or prefix scans
//!
//! # Example
//!
//! ```
//! # fn main() -> cask_log::Result<()> {
//! use cask_log::{Config, Engine};
//!
//! let folder = tempfile::tempdir()?;
//! let engine = Engine::open(folder.path(), Config::default())?;
//!
//! engine.put(b"hello", b"world")?;
//! assert_eq!(b"world".to_vec(), engine.get(b"hello")?);
//!
//! engine.delete(b"hello")?;
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]
#![deny(clippy::unwrap_used, clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]

mod batch;
mod config;
mod data_file;
mod engine;
mod error;
mod file_io;
mod index;
mod iterator;
mod merge;
mod record;
mod value_cache;

pub use {
    batch::WriteBatch,
    config::{Config, IteratorOptions, WriteBatchOptions},
    engine::Engine,
    error::{Error, Result},
    index::IndexType,
    iterator::Iter,
    record::RecordPosition,
};
