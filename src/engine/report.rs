// src/engine/report.rs

//! Per-run results handed back by `Engine::await_result`.

use std::sync::Arc;

use crate::cache::Artifact;
use crate::dag::JobState;
use crate::fingerprint::Fingerprint;
use crate::job::{JobFailure, JobId, RunId};
use crate::task::TaskId;
use crate::value::Value;

/// Final state of one job in a run.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub id: JobId,
    pub task: TaskId,
    pub fingerprint: Fingerprint,
    pub state: JobState,
    pub attempts: u32,
    /// Succeeded without computing (the artifact already existed).
    pub from_cache: bool,
    pub artifact: Option<Arc<Artifact>>,
    pub failure: Option<JobFailure>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Succeeded
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    run_id: RunId,
    target: JobId,
    jobs: Vec<JobReport>,
}

impl RunReport {
    pub fn new(run_id: RunId, target: JobId, jobs: Vec<JobReport>) -> Self {
        Self {
            run_id,
            target,
            jobs,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn target(&self) -> JobId {
        self.target
    }

    pub fn jobs(&self) -> &[JobReport] {
        &self.jobs
    }

    pub fn job(&self, id: JobId) -> Option<&JobReport> {
        self.jobs.get(id.0)
    }

    /// Artifact of the target job, or why it has none.
    pub fn outcome(&self) -> Result<Arc<Artifact>, JobFailure> {
        let Some(report) = self.job(self.target) else {
            return Err(JobFailure::logic(format!("target {} not in report", self.target)));
        };
        match (&report.artifact, &report.failure) {
            (Some(artifact), _) if report.is_success() => Ok(Arc::clone(artifact)),
            (_, Some(failure)) => Err(failure.clone()),
            _ => Err(JobFailure::logic(format!(
                "target {} ended in state {}",
                self.target, report.state
            ))),
        }
    }

    /// Output value of the target job.
    pub fn value(&self) -> Result<Value, JobFailure> {
        self.outcome().map(|artifact| artifact.value.clone())
    }

    /// Jobs that ran their compute function in this run.
    pub fn computed_jobs(&self) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|j| j.is_success() && !j.from_cache)
            .map(|j| j.id)
            .collect()
    }

    /// Every job succeeded.
    pub fn is_success(&self) -> bool {
        self.jobs.iter().all(JobReport::is_success)
    }
}
