// src/exec/job_runner.rs

//! Runs a single job attempt against the cache and the ledger.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cache::{Acquired, Cache, ComputeSlot};
use crate::database::{Database, Dataset};
use crate::engine::{JobCompletion, JobOutcome, RuntimeEvent};
use crate::errors::Result;
use crate::fingerprint::Fingerprint;
use crate::job::{FailureKind, JobFailure, JobId, RunId};
use crate::task::{Inputs, JobContext, Task, TaskOutput};
use crate::value::Value;

/// Everything needed to run one attempt of one job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub run_id: RunId,
    pub job: JobId,
    pub task: Arc<Task>,
    pub fingerprint: Fingerprint,
    /// 1-based.
    pub attempt: u32,
    pub inputs: Inputs,
    /// Effective timeout (task override, else engine default).
    pub timeout: Option<Duration>,
}

/// Run a job attempt and report the result as a `JobFinished` event.
pub async fn run_job(
    request: JobRequest,
    cache: Cache,
    db: Database,
    runtime_tx: mpsc::UnboundedSender<RuntimeEvent>,
) {
    let job = request.job;
    let attempt = request.attempt;
    let result = run_job_inner(&request, &cache, &db).await;
    if let Err(err) = &result {
        error!(
            run_id = %request.run_id,
            %job,
            task = %request.task.id(),
            error = %err,
            "job execution error"
        );
    }
    if runtime_tx
        .send(RuntimeEvent::JobFinished {
            job,
            attempt,
            result,
        })
        .is_err()
    {
        warn!(%job, "runtime gone; dropping job result");
    }
}

/// Acquire the fingerprint, compute if needed, then commit and record.
///
/// Ordering: artifact commit happens before the ledger insert, which happens
/// before the caller learns about the outcome.
pub async fn run_job_inner(request: &JobRequest, cache: &Cache, db: &Database) -> Result<JobCompletion> {
    let fp = request.fingerprint;

    let slot = match cache.acquire_or_wait(&fp).await? {
        Acquired::Existing(artifact) => {
            debug!(
                run_id = %request.run_id,
                job = %request.job,
                task = %request.task.id(),
                fingerprint = %fp.short(),
                "cache hit"
            );
            return Ok(JobCompletion {
                outcome: JobOutcome::Succeeded { from_cache: true },
                artifact: Some(artifact),
            });
        }
        Acquired::Compute(slot) => slot,
    };

    if let Some(prev) = slot.previous_failure() {
        debug!(job = %request.job, previous = %prev, "taking over abandoned computation");
    }

    info!(
        run_id = %request.run_id,
        job = %request.job,
        task = %request.task.id(),
        fingerprint = %fp.short(),
        attempt = request.attempt,
        "computing job"
    );

    let started = Instant::now();
    let computed = compute(request).await;
    let elapsed = started.elapsed();

    match computed {
        Ok(output) => commit_success(request, cache, db, slot, output, elapsed).await,
        Err(failure) => record_failure(request, cache, db, slot, failure, elapsed).await,
    }
}

async fn commit_success(
    request: &JobRequest,
    cache: &Cache,
    db: &Database,
    slot: ComputeSlot,
    output: TaskOutput,
    elapsed: Duration,
) -> Result<JobCompletion> {
    let artifact = cache.commit(slot, output, elapsed).await?;

    let row = Dataset::succeeded(
        request.run_id,
        request.job,
        request.task.id(),
        request.fingerprint,
        request.attempt,
        artifact.artifact_ref(),
    )
    .with_duration(elapsed)
    .with_metadata(artifact.metadata.clone());
    db.insert(row).await?;

    debug!(
        job = %request.job,
        task = %request.task.id(),
        elapsed_ms = elapsed.as_millis() as u64,
        "job succeeded"
    );
    Ok(JobCompletion {
        outcome: JobOutcome::Succeeded { from_cache: false },
        artifact: Some(artifact),
    })
}

async fn record_failure(
    request: &JobRequest,
    cache: &Cache,
    db: &Database,
    slot: ComputeSlot,
    failure: JobFailure,
    elapsed: Duration,
) -> Result<JobCompletion> {
    warn!(
        job = %request.job,
        task = %request.task.id(),
        attempt = request.attempt,
        %failure,
        "job attempt failed"
    );
    cache.abandon(slot, failure.clone());

    let row = Dataset::failed(
        request.run_id,
        request.job,
        request.task.id(),
        request.fingerprint,
        request.attempt,
        failure.clone(),
    )
    .with_duration(elapsed);
    db.insert(row).await?;

    Ok(JobCompletion {
        outcome: JobOutcome::Failed(failure),
        artifact: None,
    })
}

/// Invoke the compute function in its own task, under the job's timeout,
/// and check what it produced.
async fn compute(request: &JobRequest) -> std::result::Result<TaskOutput, JobFailure> {
    let ctx = JobContext {
        task: request.task.id().clone(),
        fingerprint: request.fingerprint,
        attempt: request.attempt,
        inputs: request.inputs.clone(),
    };

    let mut handle = tokio::spawn(request.task.invoke(ctx));
    let joined = match request.timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Err(JobFailure::timeout(format!(
                    "exceeded timeout of {}ms",
                    limit.as_millis()
                )));
            }
        },
        None => handle.await,
    };

    let output = match joined {
        Ok(result) => result?,
        Err(e) if e.is_panic() => return Err(JobFailure::logic(format!("compute panicked: {e}"))),
        Err(e) => return Err(JobFailure::cancelled(format!("compute task aborted: {e}"))),
    };

    check_output(&request.task, &output)?;
    Ok(output)
}

fn check_output(task: &Task, output: &TaskOutput) -> std::result::Result<(), JobFailure> {
    let expected = task.output();
    if !expected.accepts(&output.value) {
        return Err(JobFailure::logic(format!(
            "output type mismatch: expected {expected}, found {}",
            output.value.value_type()
        )));
    }

    let representable = output.value.canonical_bytes().and_then(|_| {
        Value::Map(output.metadata.clone()).canonical_bytes()
    });
    if let Err(e) = representable {
        return Err(JobFailure::new(FailureKind::Serialization, e.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    fn task(output: ValueType) -> Task {
        Task::builder("t", 1)
            .output(output)
            .compute(|_| async { Ok(TaskOutput::new(1)) })
            .build()
            .unwrap()
    }

    #[test]
    fn output_type_is_checked() {
        let err = check_output(&task(ValueType::Str), &TaskOutput::new(1)).unwrap_err();
        assert_eq!(err.kind, FailureKind::Logic);
        assert!(check_output(&task(ValueType::Any), &TaskOutput::new(1)).is_ok());
    }

    #[test]
    fn non_finite_outputs_are_serialization_failures() {
        let err = check_output(&task(ValueType::Float), &TaskOutput::new(f64::NAN)).unwrap_err();
        assert_eq!(err.kind, FailureKind::Serialization);

        let out = TaskOutput::new(1.0).with_metadata("ratio", f64::INFINITY);
        let err = check_output(&task(ValueType::Float), &out).unwrap_err();
        assert_eq!(err.kind, FailureKind::Serialization);
    }
}
