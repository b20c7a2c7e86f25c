// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the adjacency of a job graph.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which jobs are ready to run, retried, or skipped.
//! - [`job_info`] provides per-run job state and scheduled job types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod job_info;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;

pub use graph::DagGraph;
pub use job_info::{JobInfo, JobState, ScheduledJob};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
