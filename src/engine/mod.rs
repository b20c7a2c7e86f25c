// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the job scheduler
//! - the cache and the ledger
//! - the per-run event loop that reacts to:
//!   - job completion events
//!   - retry timers
//!   - cancellation requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`context`] holds the [`Engine`] that callers
//! interact with.

use std::sync::Arc;

use crate::cache::Artifact;
use crate::errors::Result;
use crate::job::{JobFailure, JobId};

/// Outcome of a job attempt for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { from_cache: bool },
    Failed(JobFailure),
}

/// What a finished job attempt hands back to the runtime.
#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub outcome: JobOutcome,
    /// Set when the attempt succeeded.
    pub artifact: Option<Arc<Artifact>>,
}

/// Events flowing into a run's runtime from job tasks, timers and handles.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// A job attempt finished. `Err` means a storage error that aborts the run.
    JobFinished {
        job: JobId,
        attempt: u32,
        result: Result<JobCompletion>,
    },
    /// The backoff delay of a job in `RetryWait` has elapsed.
    RetryDue { job: JobId },
    /// Cancellation requested through the run handle.
    CancelRequested,
}

pub mod context;
pub mod core;
pub mod event_handlers;
pub mod handle;
pub mod report;
pub mod runtime;

pub use context::Engine;
pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreEvent, CoreStep};
pub use handle::RunHandle;
pub use report::{JobReport, RunReport};
pub use runtime::{RunContext, Runtime};
