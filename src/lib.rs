// src/lib.rs

//! memodag: a memoizing workflow engine.
//!
//! Tasks are registered once, bound into a graph of jobs and submitted to an
//! [`Engine`]. Every job is fingerprinted from its task identity and inputs;
//! a job whose fingerprint already has a committed artifact is not computed
//! again, in this run or any later run sharing the same stores. Every
//! attempt that does not succeed from the cache leaves a row in the ledger
//! [`Database`].
//!
//! ```no_run
//! use memodag::{Engine, EngineConfig, Task, TaskOutput, ValueType};
//!
//! # async fn demo() -> memodag::errors::Result<()> {
//! let engine = Engine::new(EngineConfig::in_memory())?;
//! let double = engine.register_task(
//!     Task::builder("double", 1)
//!         .input("x", ValueType::Int)
//!         .output(ValueType::Int)
//!         .compute(|ctx| async move { Ok(TaskOutput::new(ctx.inputs.int("x")? * 2)) })
//!         .build()?,
//! )?;
//!
//! let handle = engine.submit(&double, [("x", 3)])?;
//! let report = engine.await_result(handle).await?;
//! assert_eq!(report.value().ok(), Some(memodag::Value::Int(6)));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod dag;
pub mod database;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fingerprint;
pub mod job;
pub mod logging;
pub mod retry;
pub mod storage;
pub mod task;
pub mod types;
pub mod value;

pub use cache::{Acquired, Artifact, Cache, CacheStats, ComputeSlot, EvictionPolicy};
pub use config::EngineConfig;
pub use database::{field, Database, Dataset, DatasetStatus, Direction, Field, Query, Rows};
pub use engine::{Engine, JobReport, RunHandle, RunReport};
pub use errors::{EngineError, Result};
pub use fingerprint::Fingerprint;
pub use job::{Binding, FailureKind, JobFailure, JobGraph, JobId, RunId};
pub use retry::{IoRetry, RetryPolicy};
pub use task::{Inputs, JobContext, Task, TaskId, TaskOutput};
pub use types::FailurePolicy;
pub use value::{Value, ValueType};
