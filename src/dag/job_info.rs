// src/dag/job_info.rs

//! Per-run job state.

use std::fmt;

use serde::Serialize;

use crate::job::{FailureKind, JobFailure, JobId, JobSpec};
use crate::task::TaskId;
use crate::types::FailurePolicy;

/// Lifecycle state of a job within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting on dependencies.
    Pending,
    /// Dependencies satisfied; waiting for a worker.
    Ready,
    Running,
    /// Failed with a retryable failure; waiting out the backoff delay.
    RetryWait,
    Succeeded,
    Failed,
    /// Never ran to completion: an upstream failed or the run was cancelled.
    Skipped,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Skipped
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Ready => "ready",
            JobState::Running => "running",
            JobState::RetryWait => "retry_wait",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Static job information plus per-run state.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: JobId,
    pub task: TaskId,
    pub failure_policy: FailurePolicy,
    /// Whether `Logic` failures may be retried.
    pub idempotent: bool,
    /// Retries allowed after the first attempt.
    pub retry_budget: u32,
    pub deps: Vec<JobId>,

    pub state: JobState,
    /// Attempts started so far.
    pub attempts: u32,
    pub from_cache: bool,
    /// Last failure (for `Failed`/`Skipped` jobs, the final one).
    pub failure: Option<JobFailure>,
}

impl JobInfo {
    pub fn from_spec(spec: &JobSpec, default_retries: u32) -> Self {
        Self {
            id: spec.id,
            task: spec.task.id().clone(),
            failure_policy: spec.task.failure_policy(),
            idempotent: spec.task.idempotent(),
            retry_budget: spec.task.max_retries().unwrap_or(default_retries),
            deps: spec.dependencies(),
            state: JobState::Pending,
            attempts: 0,
            from_cache: false,
            failure: None,
        }
    }

    /// Whether `failure` may be retried for this job, ignoring the budget.
    pub fn is_retryable(&self, failure: &JobFailure) -> bool {
        match failure.kind {
            FailureKind::Timeout | FailureKind::StorageIo => true,
            FailureKind::Logic => self.idempotent,
            FailureKind::Serialization | FailureKind::DependencyFailed | FailureKind::Cancelled => {
                false
            }
        }
    }

    pub fn retries_left(&self) -> u32 {
        self.retry_budget
            .saturating_sub(self.attempts.saturating_sub(1))
    }
}

/// A job the scheduler wants the runtime to run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub job: JobId,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Dependencies that did not succeed (only for jobs tolerating
    /// failure); their inputs are passed as absent.
    pub absent_deps: Vec<JobId>,
}
