// src/storage/memory.rs

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ArtifactStore, RecordIter, RecordStore};
use crate::database::{Dataset, Predicate};
use crate::errors::Result;

/// In-memory artifact store. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<bool> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().contains_key(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

/// In-memory ledger. Clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<Mutex<Vec<Dataset>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn append(&self, record: &Dataset) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn scan(&self, predicate: Option<&Predicate>) -> Result<RecordIter> {
        // Snapshot so the iterator doesn't hold the lock.
        let snapshot = self.records.lock().clone();
        let predicate = predicate.cloned();
        Ok(Box::new(
            snapshot
                .into_iter()
                .filter(move |r| predicate.as_ref().is_none_or(|p| p.matches(r)))
                .map(Ok),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_never_overwrites() {
        let store = MemoryArtifactStore::new();
        assert!(store.put("k", b"first").unwrap());
        assert!(!store.put("k", b"second").unwrap());
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"first"[..]));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryArtifactStore::new();
        let clone = store.clone();
        store.put("k", b"v").unwrap();
        assert!(clone.contains("k").unwrap());
        assert_eq!(clone.len(), 1);
    }
}
