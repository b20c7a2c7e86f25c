// src/dag/scheduler.rs

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::job_info::{JobInfo, JobState, ScheduledJob};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::engine::JobOutcome;
use crate::job::{JobFailure, JobGraph, JobId};
use crate::retry::RetryPolicy;

/// Scheduler holds the immutable DAG plus mutable per-run state.
///
/// It is responsible for:
/// - deciding when a job is Ready (deps satisfied, or tolerated)
/// - handing Ready jobs out in FIFO order
/// - deciding whether a failed attempt is retried, and after which delay
/// - skipping dependents of jobs that did not succeed
/// - cancellation
///
/// It does no IO; the runtime feeds it completions and acts on the returned
/// [`SchedulerStep`]s.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    jobs: Vec<JobInfo>,
    ready: VecDeque<JobId>,
    retry: RetryPolicy,
    started: bool,
    cancelled: bool,
    finished_reported: bool,
}

impl Scheduler {
    pub fn new(graph: &JobGraph, retry: RetryPolicy) -> Self {
        let jobs = graph
            .jobs()
            .iter()
            .map(|spec| JobInfo::from_spec(spec, retry.max_retries))
            .collect();
        Self {
            graph: DagGraph::from_jobs(graph),
            jobs,
            ready: VecDeque::new(),
            retry,
            started: false,
            cancelled: false,
            finished_reported: false,
        }
    }

    /// Mark root jobs Ready. Calling it twice is a no-op.
    pub fn start(&mut self) -> SchedulerStep {
        if self.started {
            warn!("scheduler: start called twice; ignoring");
            return SchedulerStep::default();
        }
        self.started = true;

        let roots: Vec<JobId> = self.graph.jobs().collect();
        let mut manager = StateManager::new(&self.graph, &mut self.jobs, &mut self.ready);
        let (newly_ready, newly_skipped) = manager.settle(roots);
        debug!(ready = newly_ready.len(), jobs = self.jobs.len(), "scheduler: run started");

        SchedulerStep {
            newly_ready,
            newly_skipped,
            run_just_finished: self.maybe_finish_run(),
            ..SchedulerStep::default()
        }
    }

    /// Hand out up to `limit` Ready jobs, marking them Running.
    pub fn take_ready(&mut self, limit: usize) -> Vec<ScheduledJob> {
        let mut scheduled = Vec::new();
        while scheduled.len() < limit {
            let Some(job) = self.ready.pop_front() else {
                break;
            };
            let absent_deps: Vec<JobId> = self
                .graph
                .dependencies_of(job)
                .iter()
                .copied()
                .filter(|d| self.jobs[d.0].state != JobState::Succeeded)
                .collect();

            let info = &mut self.jobs[job.0];
            if info.state != JobState::Ready {
                continue;
            }
            info.state = JobState::Running;
            info.attempts += 1;
            if info.attempts > 1 {
                info!(%job, task = %info.task, attempt = info.attempts, "scheduling job for retry");
            } else {
                debug!(%job, task = %info.task, "scheduling job");
            }
            scheduled.push(ScheduledJob {
                job,
                attempt: info.attempts,
                absent_deps,
            });
        }
        scheduled
    }

    /// Record the outcome of a Running job's attempt.
    pub fn handle_completion(&mut self, job: JobId, outcome: JobOutcome) -> SchedulerStep {
        let Some(info) = self.jobs.get_mut(job.0) else {
            warn!(%job, "completion for unknown job; ignoring");
            return SchedulerStep::default();
        };
        if info.state != JobState::Running {
            warn!(%job, state = %info.state, "completion for job that is not running; ignoring");
            return SchedulerStep::default();
        }

        let mut step = SchedulerStep::default();
        match outcome {
            JobOutcome::Succeeded { from_cache } => {
                info.state = JobState::Succeeded;
                info.from_cache = from_cache;
                info.failure = None;
                debug!(%job, task = %info.task, from_cache, "job succeeded");
            }
            JobOutcome::Failed(failure) => {
                let retry = !self.cancelled
                    && info.is_retryable(&failure)
                    && info.retries_left() > 0;
                if retry {
                    let delay = self.retry.delay_for(info.attempts);
                    info!(
                        %job,
                        task = %info.task,
                        attempt = info.attempts,
                        %failure,
                        "job attempt failed; retrying in {:?}",
                        delay
                    );
                    info.state = JobState::RetryWait;
                    info.failure = Some(failure);
                    step.retry_after.push((job, delay));
                    return step;
                }

                warn!(
                    %job,
                    task = %info.task,
                    attempt = info.attempts,
                    %failure,
                    "job failed; skipping dependents"
                );
                info.state = JobState::Failed;
                info.failure = Some(failure);
                step.newly_failed.push(job);
            }
        }

        let dependents = self.graph.dependents_of(job).to_vec();
        let mut manager = StateManager::new(&self.graph, &mut self.jobs, &mut self.ready);
        let (newly_ready, newly_skipped) = manager.settle(dependents);
        step.newly_ready = newly_ready;
        step.newly_skipped = newly_skipped;
        step.run_just_finished = self.maybe_finish_run();
        step
    }

    /// The backoff delay for a job in RetryWait has elapsed.
    pub fn retry_due(&mut self, job: JobId) -> SchedulerStep {
        let Some(info) = self.jobs.get_mut(job.0) else {
            warn!(%job, "retry for unknown job; ignoring");
            return SchedulerStep::default();
        };
        if info.state != JobState::RetryWait {
            // Cancelled while waiting.
            debug!(%job, state = %info.state, "retry no longer pending; ignoring");
            return SchedulerStep::default();
        }
        info.state = JobState::Ready;
        self.ready.push_back(job);
        SchedulerStep {
            newly_ready: vec![job],
            ..SchedulerStep::default()
        }
    }

    /// Skip every job that has not started. Running jobs finish normally
    /// but are not retried.
    pub fn cancel(&mut self) -> SchedulerStep {
        if self.cancelled {
            return SchedulerStep::default();
        }
        self.cancelled = true;

        let failure = JobFailure::cancelled("run cancelled");
        let mut manager = StateManager::new(&self.graph, &mut self.jobs, &mut self.ready);
        let newly_skipped = manager.skip_unstarted(&failure);
        info!(skipped = newly_skipped.len(), "scheduler: run cancelled");

        SchedulerStep {
            newly_skipped,
            run_just_finished: self.maybe_finish_run(),
            ..SchedulerStep::default()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Every job is Succeeded, Failed or Skipped.
    pub fn is_finished(&self) -> bool {
        self.jobs.iter().all(|j| j.state.is_terminal())
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.state == JobState::Running)
            .count()
    }

    pub fn state_of(&self, job: JobId) -> Option<JobState> {
        self.jobs.get(job.0).map(|j| j.state)
    }

    pub fn attempts_of(&self, job: JobId) -> Option<u32> {
        self.jobs.get(job.0).map(|j| j.attempts)
    }

    pub fn info(&self, job: JobId) -> Option<&JobInfo> {
        self.jobs.get(job.0)
    }

    pub fn jobs(&self) -> &[JobInfo] {
        &self.jobs
    }

    pub fn dependencies_of(&self, job: JobId) -> &[JobId] {
        self.graph.dependencies_of(job)
    }

    /// Returns `true` the first time every job is terminal.
    fn maybe_finish_run(&mut self) -> bool {
        if self.finished_reported || !self.is_finished() {
            return false;
        }
        self.finished_reported = true;
        info!(jobs = self.jobs.len(), "scheduler: all jobs terminal; run finished");
        true
    }
}
