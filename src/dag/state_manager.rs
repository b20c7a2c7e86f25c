// src/dag/state_manager.rs

//! Per-run state transitions for jobs in the scheduler.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::dag::DagGraph;
use crate::dag::job_info::{JobInfo, JobState};
use crate::job::{JobFailure, JobId};
use crate::types::FailurePolicy;

/// How a pending job's dependencies currently stand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepStatus {
    /// Some dependency has not finished yet.
    Waiting,
    /// Every dependency succeeded.
    Satisfied,
    /// Every dependency is terminal, some did not succeed, and the job
    /// tolerates that.
    Tolerated,
    /// A dependency did not succeed and the job propagates failures.
    Blocked(JobId),
}

/// Mutating view over the scheduler's job table and ready queue.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    jobs: &'a mut [JobInfo],
    ready: &'a mut VecDeque<JobId>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        jobs: &'a mut [JobInfo],
        ready: &'a mut VecDeque<JobId>,
    ) -> Self {
        Self { graph, jobs, ready }
    }

    pub fn dep_status(&self, job: JobId) -> DepStatus {
        let Some(info) = self.jobs.get(job.0) else {
            warn!(%job, "job missing from job table");
            return DepStatus::Waiting;
        };

        let mut waiting = false;
        let mut first_failed = None;
        for dep in self.graph.dependencies_of(job) {
            match self.jobs.get(dep.0).map(|d| d.state) {
                Some(JobState::Succeeded) => {}
                Some(JobState::Failed | JobState::Skipped) => {
                    first_failed.get_or_insert(*dep);
                }
                _ => waiting = true,
            }
        }

        // A propagating job is skipped as soon as one dependency fails.
        match (first_failed, info.failure_policy) {
            (Some(dep), FailurePolicy::Propagate) => DepStatus::Blocked(dep),
            _ if waiting => DepStatus::Waiting,
            (None, _) => DepStatus::Satisfied,
            (Some(_), FailurePolicy::Tolerate) => DepStatus::Tolerated,
        }
    }

    /// Re-evaluate the given Pending jobs after some dependency became
    /// terminal, cascading through skipped dependents.
    ///
    /// Newly ready jobs are appended to the ready queue in `JobId` order.
    /// Returns `(newly_ready, newly_skipped)`.
    pub fn settle(&mut self, roots: Vec<JobId>) -> (Vec<JobId>, Vec<(JobId, JobFailure)>) {
        let mut worklist = roots;
        let mut ready = Vec::new();
        let mut skipped = Vec::new();

        while let Some(job) = worklist.pop() {
            if self.jobs.get(job.0).map(|j| j.state) != Some(JobState::Pending) {
                continue;
            }
            match self.dep_status(job) {
                DepStatus::Waiting => {}
                DepStatus::Satisfied | DepStatus::Tolerated => {
                    self.jobs[job.0].state = JobState::Ready;
                    ready.push(job);
                }
                DepStatus::Blocked(dep) => {
                    let dep_task = self.jobs[dep.0].task.clone();
                    let failure = JobFailure::dependency_failed(format!(
                        "dependency {dep} ({dep_task}) did not succeed"
                    ));
                    let info = &mut self.jobs[job.0];
                    debug!(%job, task = %info.task, %dep, "skipping job: upstream failed");
                    info.state = JobState::Skipped;
                    info.failure = Some(failure.clone());
                    skipped.push((job, failure));
                    worklist.extend(self.graph.dependents_of(job).iter().copied());
                }
            }
        }

        ready.sort();
        self.ready.extend(ready.iter().copied());
        skipped.sort_by_key(|(job, _)| *job);
        (ready, skipped)
    }

    /// Skip every job that has not started (Pending, Ready, RetryWait).
    pub fn skip_unstarted(&mut self, failure: &JobFailure) -> Vec<(JobId, JobFailure)> {
        self.ready.clear();
        let mut skipped = Vec::new();
        for info in self.jobs.iter_mut() {
            if matches!(
                info.state,
                JobState::Pending | JobState::Ready | JobState::RetryWait
            ) {
                info.state = JobState::Skipped;
                info.failure = Some(failure.clone());
                skipped.push((info.id, failure.clone()));
            }
        }
        skipped
    }

    pub fn all_terminal(&self) -> bool {
        self.jobs.iter().all(|j| j.state.is_terminal())
    }
}
