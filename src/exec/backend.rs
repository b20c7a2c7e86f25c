// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime hands ready jobs to an `ExecutorBackend` instead of spawning
//! them itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production path in [`job_runner`](super::job_runner).
//!
//! - `CacheExecutor` is the default implementation used by the engine. It
//!   spawns one Tokio task per job, which goes through the cache and the
//!   ledger and reports back with a `JobFinished` event.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which jobs were dispatched and directly emits `JobFinished` events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::Cache;
use crate::database::Database;
use crate::engine::RuntimeEvent;
use crate::errors::Result;

use super::job_runner::{run_job, JobRequest};

/// Trait abstracting how dispatched jobs are executed.
pub trait ExecutorBackend: Send {
    /// Start the given job attempts.
    ///
    /// Each attempt must eventually produce exactly one
    /// `RuntimeEvent::JobFinished` on the runtime's channel.
    fn spawn_jobs(
        &mut self,
        jobs: Vec<JobRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Executor backend used by the engine.
pub struct CacheExecutor {
    cache: Cache,
    db: Database,
    runtime_tx: mpsc::UnboundedSender<RuntimeEvent>,
}

impl CacheExecutor {
    pub fn new(cache: Cache, db: Database, runtime_tx: mpsc::UnboundedSender<RuntimeEvent>) -> Self {
        Self {
            cache,
            db,
            runtime_tx,
        }
    }
}

impl ExecutorBackend for CacheExecutor {
    fn spawn_jobs(
        &mut self,
        jobs: Vec<JobRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for request in jobs {
                debug!(job = %request.job, attempt = request.attempt, "spawning job");
                tokio::spawn(run_job(
                    request,
                    self.cache.clone(),
                    self.db.clone(),
                    self.runtime_tx.clone(),
                ));
            }
            Ok(())
        })
    }
}
