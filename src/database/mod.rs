// src/database/mod.rs

//! Append-only ledger of job outcomes.
//!
//! Every job attempt that ends in a failure, every skipped job and every
//! computed success produces one [`Dataset`] row. Rows are never updated.

pub mod dataset;
pub mod query;

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::errors::Result;
use crate::fingerprint::Fingerprint;
use crate::retry::IoRetry;
use crate::storage::{MemoryRecordStore, RecordIter, RecordStore};

pub use dataset::{ArtifactRef, Dataset, DatasetStatus};
pub use query::{field, where_, CompareOp, Direction, Field, FieldRef, Predicate, Query};

/// Handle to the ledger. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn RecordStore>,
    io: IoRetry,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("store", &self.store)
            .field("io", &self.io)
            .finish()
    }
}

impl Database {
    pub fn new(store: Arc<dyn RecordStore>, io: IoRetry) -> Self {
        Self { store, io }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRecordStore::new()), IoRetry::default())
    }

    /// Append a row. Durable once this returns.
    pub async fn insert(&self, record: Dataset) -> Result<()> {
        trace!(
            run_id = %record.run_id,
            job = %record.job,
            task = %record.task,
            status = %record.status,
            attempt = record.attempt,
            "inserting dataset"
        );
        let store = Arc::clone(&self.store);
        let record = Arc::new(record);
        self.io
            .run_blocking("dataset insert", move || store.append(&record))
            .await
    }

    /// Build a lazy result set. Nothing is read until [`Rows::iter`].
    pub fn query(&self, query: Query) -> Rows {
        Rows {
            store: Arc::clone(&self.store),
            query,
        }
    }

    /// All rows for one fingerprint, oldest first.
    pub fn history(&self, fingerprint: &Fingerprint) -> Result<Vec<Dataset>> {
        self.query(
            where_(field(Field::Fingerprint).eq(fingerprint))
                .order_by(Field::CreatedAt, Direction::Asc),
        )
        .fetch()
    }

    pub fn count(&self, query: Query) -> Result<usize> {
        let mut n = 0;
        for row in self.query(query).iter()? {
            row?;
            n += 1;
        }
        Ok(n)
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}

/// Result set of a [`Query`]. Each call to [`Rows::iter`] rescans the ledger,
/// so rows appended in between are visible.
pub struct Rows {
    store: Arc<dyn RecordStore>,
    query: Query,
}

impl Rows {
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn iter(&self) -> Result<RecordIter> {
        let scan = self.store.scan(Some(self.query.predicate()))?;
        let limit = self.query.max_rows().unwrap_or(usize::MAX);

        if self.query.ordering().is_none() {
            return Ok(Box::new(scan.take(limit)));
        }

        // Ordering needs the whole filtered set.
        let mut rows = scan.collect::<Result<Vec<_>>>()?;
        self.query.sort(&mut rows);
        rows.truncate(limit);
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    pub fn fetch(&self) -> Result<Vec<Dataset>> {
        self.iter()?.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobFailure, JobId, RunId};
    use crate::task::TaskId;

    fn failed(task: &TaskId, fp: Fingerprint, attempt: u32) -> Dataset {
        Dataset::failed(
            RunId::new(),
            JobId(0),
            task,
            fp,
            attempt,
            JobFailure::logic("boom"),
        )
    }

    #[tokio::test]
    async fn rows_are_restartable_and_see_new_inserts() {
        let db = Database::in_memory();
        let task = TaskId::new("t", 1);
        let fp = Fingerprint::from_bytes([1; 32]);

        db.insert(failed(&task, fp, 1)).await.unwrap();
        let rows = db.query(where_(field(Field::Task).eq("t")));
        assert_eq!(rows.fetch().unwrap().len(), 1);

        db.insert(failed(&task, fp, 2)).await.unwrap();
        assert_eq!(rows.fetch().unwrap().len(), 2);
        assert_eq!(rows.fetch().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn history_limit_and_count() {
        let db = Database::in_memory();
        let task = TaskId::new("t", 1);
        let a = Fingerprint::from_bytes([1; 32]);
        let b = Fingerprint::from_bytes([2; 32]);
        for attempt in 1..=3 {
            db.insert(failed(&task, a, attempt)).await.unwrap();
        }
        db.insert(failed(&task, b, 1)).await.unwrap();

        let history = db.history(&a).unwrap();
        let attempts: Vec<u32> = history.iter().map(|r| r.attempt).collect();
        assert_eq!(attempts, [1, 2, 3]);

        let latest = db
            .query(
                Query::all()
                    .order_by(Field::Attempt, Direction::Desc)
                    .limit(1),
            )
            .fetch()
            .unwrap();
        assert_eq!(latest[0].attempt, 3);

        assert_eq!(db.count(Query::all()).unwrap(), 4);
        assert_eq!(
            db.count(where_(field(Field::Fingerprint).eq(b))).unwrap(),
            1
        );
    }
}
