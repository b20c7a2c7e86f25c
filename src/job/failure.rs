// src/job/failure.rs

//! Failure values attached to job outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a failed (or skipped) job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The task's own logic failed (or panicked, or produced a bad output).
    Logic,
    /// The job exceeded its wall-clock budget.
    Timeout,
    /// The cache or ledger backend failed.
    StorageIo,
    /// The task produced a value with no canonical representation.
    Serialization,
    /// An upstream job did not succeed.
    DependencyFailed,
    /// The run was cancelled before the job could run.
    Cancelled,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Logic => "logic",
            FailureKind::Timeout => "timeout",
            FailureKind::StorageIo => "storage_io",
            FailureKind::Serialization => "serialization",
            FailureKind::DependencyFailed => "dependency_failed",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed job outcome: what kind of failure, and a readable cause.
///
/// Failures are values, not errors: they are recorded in the ledger and
/// reported through the run handle, never cached as successes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub cause: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }

    pub fn logic(cause: impl fmt::Display) -> Self {
        Self::new(FailureKind::Logic, cause.to_string())
    }

    pub fn timeout(cause: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, cause)
    }

    pub fn storage(cause: impl fmt::Display) -> Self {
        Self::new(FailureKind::StorageIo, cause.to_string())
    }

    pub fn cancelled(cause: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, cause)
    }

    pub fn dependency_failed(cause: impl Into<String>) -> Self {
        Self::new(FailureKind::DependencyFailed, cause)
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.cause)
    }
}

impl From<anyhow::Error> for JobFailure {
    fn from(err: anyhow::Error) -> Self {
        JobFailure::logic(format!("{err:#}"))
    }
}
