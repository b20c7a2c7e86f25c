// src/database/dataset.rs

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fingerprint::Fingerprint;
use crate::job::{JobFailure, JobId, RunId};
use crate::task::TaskId;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl DatasetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetStatus::Succeeded => "succeeded",
            DatasetStatus::Failed => "failed",
            DatasetStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pointer from a ledger row to the stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub key: String,
    pub size: u64,
}

/// One ledger row: the outcome of a single job attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub run_id: RunId,
    pub job: JobId,
    pub fingerprint: Fingerprint,
    pub task: String,
    pub version: u32,
    pub status: DatasetStatus,
    /// 1-based; 0 for jobs skipped before their first attempt.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Dataset {
    fn base(
        run_id: RunId,
        job: JobId,
        task: &TaskId,
        fingerprint: Fingerprint,
        status: DatasetStatus,
        attempt: u32,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            run_id,
            job,
            fingerprint,
            task: task.name.clone(),
            version: task.version,
            status,
            attempt,
            created_at: Utc::now(),
            duration_ms: 0,
            artifact: None,
            failure: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn succeeded(
        run_id: RunId,
        job: JobId,
        task: &TaskId,
        fingerprint: Fingerprint,
        attempt: u32,
        artifact: ArtifactRef,
    ) -> Self {
        Self {
            artifact: Some(artifact),
            ..Self::base(run_id, job, task, fingerprint, DatasetStatus::Succeeded, attempt)
        }
    }

    pub fn failed(
        run_id: RunId,
        job: JobId,
        task: &TaskId,
        fingerprint: Fingerprint,
        attempt: u32,
        failure: JobFailure,
    ) -> Self {
        Self {
            failure: Some(failure),
            ..Self::base(run_id, job, task, fingerprint, DatasetStatus::Failed, attempt)
        }
    }

    pub fn skipped(
        run_id: RunId,
        job: JobId,
        task: &TaskId,
        fingerprint: Fingerprint,
        attempt: u32,
        failure: JobFailure,
    ) -> Self {
        Self {
            failure: Some(failure),
            ..Self::base(run_id, job, task, fingerprint, DatasetStatus::Skipped, attempt)
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn created_at_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }
}
