use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use memodag::cache::Artifact;
use memodag::engine::{JobCompletion, JobOutcome, RuntimeEvent};
use memodag::errors::Result;
use memodag::exec::{ExecutorBackend, JobRequest};
use memodag::{JobFailure, JobId, TaskOutput};

/// A fake executor that:
/// - records which jobs were "run", with their attempt number
/// - immediately reports a `JobFinished` for each dispatched job
///
/// Jobs succeed with the value `1` unless a failure was scripted for them
/// with [`FakeExecutor::fail`]. Nothing touches the cache or the ledger.
pub struct FakeExecutor {
    runtime_tx: mpsc::UnboundedSender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<(JobId, u32)>>>,
    failures: HashMap<JobId, Vec<JobFailure>>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::UnboundedSender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<(JobId, u32)>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            failures: HashMap::new(),
        }
    }

    /// Make the next attempt of `job` fail with `failure`. Calls queue up.
    pub fn fail(mut self, job: JobId, failure: JobFailure) -> Self {
        self.failures.entry(job).or_default().push(failure);
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_jobs(
        &mut self,
        jobs: Vec<JobRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            for request in jobs {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push((request.job, request.attempt));
                }

                let scripted = self
                    .failures
                    .get_mut(&request.job)
                    .filter(|queue| !queue.is_empty())
                    .map(|queue| queue.remove(0));

                let completion = match scripted {
                    Some(failure) => JobCompletion {
                        outcome: JobOutcome::Failed(failure),
                        artifact: None,
                    },
                    None => JobCompletion {
                        outcome: JobOutcome::Succeeded { from_cache: false },
                        artifact: Some(Arc::new(Artifact::new(
                            request.fingerprint,
                            TaskOutput::new(1),
                            Duration::ZERO,
                        ))),
                    },
                };

                tx.send(RuntimeEvent::JobFinished {
                    job: request.job,
                    attempt: request.attempt,
                    result: Ok(completion),
                })
                .map_err(|e| anyhow::anyhow!("runtime channel closed: {e}"))?;
            }
            Ok(())
        })
    }
}
