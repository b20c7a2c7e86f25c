// src/engine/runtime.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cache::Artifact;
use crate::dag::ScheduledJob;
use crate::database::{Database, Dataset};
use crate::errors::{EngineError, Result};
use crate::exec::{ExecutorBackend, JobRequest};
use crate::fingerprint::{fingerprint, Fingerprint, ResolvedInput};
use crate::job::{Binding, FailureKind, JobFailure, JobGraph, JobId, RunId};
use crate::task::Inputs;

use super::core::CoreRuntime;
use super::report::{JobReport, RunReport};
use super::{CoreCommand, CoreEvent, CoreStep, JobCompletion, JobOutcome, RuntimeEvent};

/// Per-run data the shell needs to turn scheduled jobs into requests.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: RunId,
    pub graph: JobGraph,
    /// Submission-time fingerprints, indexed by `JobId`.
    pub fingerprints: Vec<Fingerprint>,
    pub db: Database,
    /// Used for tasks without their own timeout.
    pub job_timeout: Option<Duration>,
}

/// Drives the job scheduler of one run in response to `RuntimeEvent`s,
/// and delegates job execution to an `ExecutorBackend`.
///
/// This is an IO shell around `CoreRuntime`, which contains the scheduling
/// semantics. The shell resolves inputs, writes ledger rows for skipped
/// jobs, arms retry timers and turns storage errors into a run-level error.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    ctx: RunContext,
    event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    event_tx: mpsc::UnboundedSender<RuntimeEvent>,
    executor: E,
    /// Fingerprints as dispatched; differ from submission time only when a
    /// tolerated dependency was absent somewhere upstream.
    fingerprints: Vec<Fingerprint>,
    results: HashMap<JobId, Arc<Artifact>>,
    fatal: Option<EngineError>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("run_id", &self.ctx.run_id)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        ctx: RunContext,
        event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
        event_tx: mpsc::UnboundedSender<RuntimeEvent>,
        executor: E,
    ) -> Self {
        let fingerprints = ctx.fingerprints.clone();
        Self {
            core,
            ctx,
            event_rx,
            event_tx,
            executor,
            fingerprints,
            results: HashMap::new(),
            fatal: None,
        }
    }

    /// Main event loop.
    ///
    /// - Starts the scheduler and dispatches the first batch.
    /// - Consumes `RuntimeEvent`s and feeds them into the core.
    /// - Executes the commands returned by the core.
    ///
    /// Returns once every job is terminal. A storage error anywhere in the
    /// run cancels the remaining jobs and is returned instead of the report.
    pub async fn run(mut self) -> Result<RunReport> {
        info!(
            run_id = %self.ctx.run_id,
            jobs = self.ctx.graph.len(),
            workers = self.core.workers(),
            "run started"
        );

        let step = self.core.start();
        self.execute(step).await;

        while !self.core.scheduler().is_finished() {
            let Some(event) = self.event_rx.recv().await else {
                warn!(run_id = %self.ctx.run_id, "runtime event channel closed; exiting");
                break;
            };

            let core_event = match event {
                RuntimeEvent::JobFinished {
                    job,
                    attempt,
                    result,
                } => self.on_job_finished(job, attempt, result).await,
                RuntimeEvent::RetryDue { job } => CoreEvent::RetryDue { job },
                RuntimeEvent::CancelRequested => {
                    info!(run_id = %self.ctx.run_id, "cancel requested");
                    CoreEvent::CancelRequested
                }
            };

            // Commands may queue follow-up events (failed preparation, a
            // ledger error), so the loop checks the scheduler, not the step.
            let step = self.core.step(core_event);
            self.execute(step).await;
        }

        if let Some(err) = self.fatal.take() {
            error!(run_id = %self.ctx.run_id, error = %err, "run aborted");
            return Err(err);
        }

        let report = self.report();
        info!(
            run_id = %self.ctx.run_id,
            success = report.is_success(),
            computed = report.computed_jobs().len(),
            "run finished"
        );
        Ok(report)
    }

    async fn on_job_finished(
        &mut self,
        job: JobId,
        attempt: u32,
        result: Result<JobCompletion>,
    ) -> CoreEvent {
        debug!(run_id = %self.ctx.run_id, %job, attempt, "job attempt finished");
        let outcome = match result {
            Ok(completion) => {
                if let Some(artifact) = completion.artifact {
                    self.results.insert(job, artifact);
                }
                completion.outcome
            }
            Err(err) => {
                let failure = match &err {
                    EngineError::StorageIo { .. } => JobFailure::storage(&err),
                    EngineError::Serialization(msg) => {
                        JobFailure::new(FailureKind::Serialization, msg.clone())
                    }
                    _ => JobFailure::logic(&err),
                };
                self.record_attempt_error(job, attempt, &failure).await;
                if err.is_storage() {
                    self.abort(err);
                }
                JobOutcome::Failed(failure)
            }
        };
        CoreEvent::JobCompleted { job, outcome }
    }

    /// Ledger row for an attempt whose runner returned an error before it
    /// could write one itself. Best effort: the ledger may be what failed.
    async fn record_attempt_error(&mut self, job: JobId, attempt: u32, failure: &JobFailure) {
        let spec = &self.ctx.graph.jobs()[job.0];
        let row = Dataset::failed(
            self.ctx.run_id,
            job,
            spec.task.id(),
            self.fingerprints[job.0],
            attempt,
            failure.clone(),
        );
        if let Err(err) = self.ctx.db.insert(row).await {
            warn!(
                run_id = %self.ctx.run_id,
                %job,
                attempt,
                error = %err,
                "could not record failed attempt"
            );
        }
    }

    /// Record the first storage error and ask the core to cancel.
    fn abort(&mut self, err: EngineError) {
        if self.fatal.is_some() {
            return;
        }
        error!(run_id = %self.ctx.run_id, error = %err, "storage failure; cancelling run");
        self.fatal = Some(err);
        self.send(RuntimeEvent::CancelRequested);
    }

    fn send(&self, event: RuntimeEvent) {
        // The receiver lives in `self`, so this cannot fail while running.
        let _ = self.event_tx.send(event);
    }

    async fn execute(&mut self, step: CoreStep) {
        for command in step.commands {
            match command {
                CoreCommand::Dispatch(jobs) => self.dispatch(jobs).await,
                CoreCommand::RecordSkipped(skipped) => self.record_skipped(skipped).await,
                CoreCommand::ArmRetry { job, delay } => self.arm_retry(job, delay),
            }
        }
    }

    async fn dispatch(&mut self, jobs: Vec<ScheduledJob>) {
        let mut requests = Vec::with_capacity(jobs.len());
        for scheduled in jobs {
            match self.prepare(&scheduled) {
                Ok(request) => requests.push(request),
                Err(failure) => self.fail_before_start(&scheduled, failure).await,
            }
        }
        if requests.is_empty() {
            return;
        }

        let jobs: Vec<JobId> = requests.iter().map(|r| r.job).collect();
        debug!(run_id = %self.ctx.run_id, ?jobs, "dispatching jobs");
        if let Err(err) = self.executor.spawn_jobs(requests).await {
            error!(run_id = %self.ctx.run_id, error = %err, "executor failed to start jobs");
            for job in jobs {
                self.send(RuntimeEvent::JobFinished {
                    job,
                    attempt: self.core.scheduler().attempts_of(job).unwrap_or(0),
                    result: Ok(JobCompletion {
                        outcome: JobOutcome::Failed(JobFailure::logic(&err)),
                        artifact: None,
                    }),
                });
            }
        }
    }

    /// Resolve a scheduled job's inputs and effective fingerprint.
    fn prepare(&mut self, scheduled: &ScheduledJob) -> std::result::Result<JobRequest, JobFailure> {
        let spec = &self.ctx.graph.jobs()[scheduled.job.0];
        let mut values = BTreeMap::new();
        let mut resolved = BTreeMap::new();

        for (name, binding) in &spec.bindings {
            match binding {
                Binding::Literal(value) => {
                    values.insert(name.clone(), Some(value.clone()));
                    resolved.insert(name.clone(), ResolvedInput::Literal(value.clone()));
                }
                Binding::Output(dep) if scheduled.absent_deps.contains(dep) => {
                    values.insert(name.clone(), None);
                    resolved.insert(name.clone(), ResolvedInput::Absent);
                }
                Binding::Output(dep) => {
                    let Some(artifact) = self.results.get(dep) else {
                        return Err(JobFailure::logic(format!(
                            "no artifact for upstream {dep} of input '{name}'"
                        )));
                    };
                    if let Some(param) = spec.task.input(name) {
                        if !param.ty.accepts(&artifact.value) {
                            return Err(JobFailure::logic(format!(
                                "input '{name}' expects {}, upstream {dep} produced {}",
                                param.ty,
                                artifact.value.value_type()
                            )));
                        }
                    }
                    values.insert(name.clone(), Some(artifact.value.clone()));
                    resolved.insert(name.clone(), ResolvedInput::Dependency(self.fingerprints[dep.0]));
                }
            }
        }

        let fp = fingerprint(&spec.task, &resolved)
            .map_err(|e| JobFailure::new(FailureKind::Serialization, e.to_string()))?;
        if fp != self.ctx.fingerprints[scheduled.job.0] {
            debug!(job = %scheduled.job, fingerprint = %fp.short(), "fingerprint changed by absent inputs");
        }
        self.fingerprints[scheduled.job.0] = fp;

        Ok(JobRequest {
            run_id: self.ctx.run_id,
            job: scheduled.job,
            task: Arc::clone(&spec.task),
            fingerprint: fp,
            attempt: scheduled.attempt,
            inputs: Inputs::new(values),
            timeout: spec.task.timeout().or(self.ctx.job_timeout),
        })
    }

    async fn fail_before_start(&mut self, scheduled: &ScheduledJob, failure: JobFailure) {
        let spec = &self.ctx.graph.jobs()[scheduled.job.0];
        warn!(
            run_id = %self.ctx.run_id,
            job = %scheduled.job,
            task = %spec.task.id(),
            %failure,
            "job failed before start"
        );
        let row = Dataset::failed(
            self.ctx.run_id,
            scheduled.job,
            spec.task.id(),
            self.fingerprints[scheduled.job.0],
            scheduled.attempt,
            failure.clone(),
        );
        if let Err(err) = self.ctx.db.insert(row).await {
            self.abort(err);
        }
        self.send(RuntimeEvent::JobFinished {
            job: scheduled.job,
            attempt: scheduled.attempt,
            result: Ok(JobCompletion {
                outcome: JobOutcome::Failed(failure),
                artifact: None,
            }),
        });
    }

    async fn record_skipped(&mut self, skipped: Vec<(JobId, JobFailure)>) {
        for (job, failure) in skipped {
            let spec = &self.ctx.graph.jobs()[job.0];
            let attempts = self.core.scheduler().attempts_of(job).unwrap_or(0);
            debug!(run_id = %self.ctx.run_id, %job, task = %spec.task.id(), %failure, "job skipped");
            let row = Dataset::skipped(
                self.ctx.run_id,
                job,
                spec.task.id(),
                self.fingerprints[job.0],
                attempts,
                failure,
            );
            if let Err(err) = self.ctx.db.insert(row).await {
                self.abort(err);
            }
        }
    }

    fn arm_retry(&self, job: JobId, delay: Duration) {
        debug!(run_id = %self.ctx.run_id, %job, delay_ms = delay.as_millis() as u64, "retry armed");
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(RuntimeEvent::RetryDue { job });
        });
    }

    fn report(&self) -> RunReport {
        let jobs = self
            .core
            .scheduler()
            .jobs()
            .iter()
            .map(|info| JobReport {
                id: info.id,
                task: info.task.clone(),
                fingerprint: self.fingerprints[info.id.0],
                state: info.state,
                attempts: info.attempts,
                from_cache: info.from_cache,
                artifact: self.results.get(&info.id).cloned(),
                failure: info.failure.clone(),
            })
            .collect();
        RunReport::new(
            self.ctx.run_id,
            self.ctx.graph.target().unwrap_or(JobId(0)),
            jobs,
        )
    }
}
