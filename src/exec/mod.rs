// src/exec/mod.rs

//! Job execution layer.
//!
//! This module actually runs job attempts: it goes through the cache, calls
//! the task's compute function under a timeout, commits or abandons, writes
//! the ledger row, and reports back to the runtime via `RuntimeEvent`s.
//!
//! - [`job_runner`] handles a single job attempt.
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `CacheExecutor` that the runtime uses in production, and which tests
//!   can replace with a fake implementation.

pub mod backend;
pub mod job_runner;

pub use backend::{CacheExecutor, ExecutorBackend};
pub use job_runner::{run_job, JobRequest};
