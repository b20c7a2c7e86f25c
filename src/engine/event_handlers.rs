// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::Duration;

use crate::dag::{ScheduledJob, Scheduler, SchedulerStep};
use crate::engine::JobOutcome;
use crate::job::{JobFailure, JobId};

/// Events the pure core understands.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    JobCompleted { job: JobId, outcome: JobOutcome },
    RetryDue { job: JobId },
    CancelRequested,
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Start these job attempts.
    Dispatch(Vec<ScheduledJob>),
    /// Write ledger rows for jobs that will never run.
    RecordSkipped(Vec<(JobId, JobFailure)>),
    /// Emit `RetryDue` for `job` after `delay`.
    ArmRetry { job: JobId, delay: Duration },
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Handle a finished job attempt.
pub fn handle_job_completed(
    scheduler: &mut Scheduler,
    workers: usize,
    job: JobId,
    outcome: JobOutcome,
) -> CoreStep {
    let step = scheduler.handle_completion(job, outcome);
    commands_from_step(scheduler, workers, step)
}

/// Handle an elapsed retry timer.
pub fn handle_retry_due(scheduler: &mut Scheduler, workers: usize, job: JobId) -> CoreStep {
    let step = scheduler.retry_due(job);
    commands_from_step(scheduler, workers, step)
}

/// Handle a cancellation request.
pub fn handle_cancel(scheduler: &mut Scheduler, workers: usize) -> CoreStep {
    let step = scheduler.cancel();
    commands_from_step(scheduler, workers, step)
}

/// Translate a scheduler step into commands, then fill free worker slots.
pub fn commands_from_step(
    scheduler: &mut Scheduler,
    workers: usize,
    step: SchedulerStep,
) -> CoreStep {
    let mut commands = Vec::new();

    if !step.newly_skipped.is_empty() {
        commands.push(CoreCommand::RecordSkipped(step.newly_skipped));
    }
    for (job, delay) in step.retry_after {
        commands.push(CoreCommand::ArmRetry { job, delay });
    }

    let free = workers.saturating_sub(scheduler.running_count());
    if free > 0 && scheduler.has_ready() {
        let jobs = scheduler.take_ready(free);
        if !jobs.is_empty() {
            commands.push(CoreCommand::Dispatch(jobs));
        }
    }

    CoreStep {
        commands,
        keep_running: !scheduler.is_finished(),
    }
}
