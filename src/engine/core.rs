// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`CoreEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - handing jobs to the executor
//! - ledger writes for skipped jobs and retry timers
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, storage, or compute.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    commands_from_step, handle_cancel, handle_job_completed, handle_retry_due, CoreEvent,
    CoreStep,
};

/// Pure core runtime state.
///
/// This owns the job scheduler and the worker limit. It has **no**
/// channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    workers: usize,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, workers: usize) -> Self {
        Self {
            scheduler,
            workers: workers.max(1),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start the run: mark roots ready and dispatch the first batch.
    pub fn start(&mut self) -> CoreStep {
        let step = self.scheduler.start();
        commands_from_step(&mut self.scheduler, self.workers, step)
    }

    /// Handle a single event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: CoreEvent) -> CoreStep {
        match event {
            CoreEvent::JobCompleted { job, outcome } => {
                handle_job_completed(&mut self.scheduler, self.workers, job, outcome)
            }
            CoreEvent::RetryDue { job } => handle_retry_due(&mut self.scheduler, self.workers, job),
            CoreEvent::CancelRequested => handle_cancel(&mut self.scheduler, self.workers),
        }
    }
}
