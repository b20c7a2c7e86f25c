// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use std::time::Duration;

use crate::job::{JobFailure, JobId};

/// Structured result of a single scheduler "step".
///
/// The runtime acts on it (records skipped jobs, arms retry timers); tests
/// use it to step the state machine by hand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerStep {
    /// Jobs that became Ready in this step, in queue order.
    pub newly_ready: Vec<JobId>,
    /// Jobs that ended `Failed` in this step (retries exhausted or not
    /// retryable).
    pub newly_failed: Vec<JobId>,
    /// Jobs that ended `Skipped`, with the reason.
    pub newly_skipped: Vec<(JobId, JobFailure)>,
    /// Jobs moved to `RetryWait`; each must be passed to `retry_due` after
    /// the delay.
    pub retry_after: Vec<(JobId, Duration)>,
    /// Whether this step made every job terminal.
    pub run_just_finished: bool,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.newly_ready.is_empty()
            && self.newly_failed.is_empty()
            && self.newly_skipped.is_empty()
            && self.retry_after.is_empty()
            && !self.run_just_finished
    }
}
