#![allow(dead_code)]

//! Fault-injecting store wrappers.
//!
//! Both wrappers delegate to an inner store and fail writes on demand with
//! a `StorageIo` error, either for the next `n` writes or for every write
//! until cleared.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use memodag::database::{Dataset, Predicate};
use memodag::errors::{EngineError, Result};
use memodag::storage::{
    ArtifactStore, MemoryArtifactStore, MemoryRecordStore, RecordIter, RecordStore,
};

#[derive(Debug, Default)]
struct Faults {
    fail_next: AtomicUsize,
    fail_all: AtomicBool,
    injected: AtomicUsize,
}

impl Faults {
    fn check(&self, what: &str) -> Result<()> {
        let fail = self.fail_all.load(Ordering::SeqCst)
            || self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if fail {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(EngineError::storage(
                format!("injected {what} fault"),
                io::Error::other("disk on fire"),
            ));
        }
        Ok(())
    }
}

/// `ArtifactStore` whose `put` can be made to fail.
#[derive(Debug, Clone)]
pub struct FlakyArtifactStore {
    inner: Arc<dyn ArtifactStore>,
    faults: Arc<Faults>,
}

impl FlakyArtifactStore {
    pub fn new(inner: Arc<dyn ArtifactStore>) -> Self {
        Self {
            inner,
            faults: Arc::default(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryArtifactStore::new()))
    }

    pub fn fail_next_puts(&self, n: usize) {
        self.faults.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn fail_all_puts(&self, on: bool) {
        self.faults.fail_all.store(on, Ordering::SeqCst);
    }

    /// Faults injected so far.
    pub fn injected(&self) -> usize {
        self.faults.injected.load(Ordering::SeqCst)
    }
}

impl ArtifactStore for FlakyArtifactStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<bool> {
        self.faults.check("put")?;
        self.inner.put(key, bytes)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }
}

/// `RecordStore` whose `append` can be made to fail.
#[derive(Debug, Clone)]
pub struct FlakyRecordStore {
    inner: Arc<dyn RecordStore>,
    faults: Arc<Faults>,
}

impl FlakyRecordStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            faults: Arc::default(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRecordStore::new()))
    }

    pub fn fail_next_appends(&self, n: usize) {
        self.faults.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn fail_all_appends(&self, on: bool) {
        self.faults.fail_all.store(on, Ordering::SeqCst);
    }

    pub fn injected(&self) -> usize {
        self.faults.injected.load(Ordering::SeqCst)
    }
}

impl RecordStore for FlakyRecordStore {
    fn append(&self, record: &Dataset) -> Result<()> {
        self.faults.check("append")?;
        self.inner.append(record)
    }

    fn scan(&self, predicate: Option<&Predicate>) -> Result<RecordIter> {
        self.inner.scan(predicate)
    }
}
