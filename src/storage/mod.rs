// src/storage/mod.rs

//! Storage backend boundary.
//!
//! The engine persists two kinds of data:
//! - artifact bytes, keyed by fingerprint ([`ArtifactStore`])
//! - ledger records ([`RecordStore`]), appended and scanned
//!
//! Both traits are synchronous; async callers run them on the blocking pool.
//! Implementations must be durable before returning from a write.
//!
//! - [`memory`] keeps everything in process memory (tests, ephemeral runs).
//! - [`fs`] stores artifacts as files and the ledger as JSON lines.

use std::fmt::Debug;

use crate::database::{Dataset, Predicate};
use crate::errors::Result;

pub mod fs;
pub mod memory;

pub use fs::{FsArtifactStore, FsRecordStore};
pub use memory::{MemoryArtifactStore, MemoryRecordStore};

/// Lazily evaluated sequence of ledger records.
pub type RecordIter = Box<dyn Iterator<Item = Result<Dataset>> + Send>;

/// Key/value store for artifact bytes.
pub trait ArtifactStore: Send + Sync + Debug {
    /// Store `bytes` under `key` unless the key already exists.
    ///
    /// Returns `true` if this call wrote the value, `false` if an existing
    /// value was kept. Existing values are never overwritten.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<bool>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All stored keys, in no particular order.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Append-only store for ledger records.
pub trait RecordStore: Send + Sync + Debug {
    fn append(&self, record: &Dataset) -> Result<()>;

    /// Iterate over records in insertion order, keeping only those matching
    /// `predicate` (all records when `None`).
    fn scan(&self, predicate: Option<&Predicate>) -> Result<RecordIter>;
}
