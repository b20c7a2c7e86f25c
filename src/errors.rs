// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::job::JobId;
use crate::task::TaskId;

#[derive(Error, Debug)]
pub enum EngineError {
    /// An input or output value has no canonical representation.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Bound inputs don't match the task's declared parameter list.
    #[error("Arity error for task '{task}': {detail}")]
    Arity { task: TaskId, detail: String },

    #[error("Type mismatch for task '{task}', parameter '{param}': expected {expected}, found {found}")]
    TypeMismatch {
        task: TaskId,
        param: String,
        expected: String,
        found: String,
    },

    #[error("Task '{0}' is already registered with a different specification")]
    DuplicateTask(TaskId),

    #[error("Invalid task definition: {0}")]
    InvalidTask(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    #[error("Cannot submit an empty job graph")]
    EmptyGraph,

    #[error("Cycle detected in job graph: {0}")]
    DagCycle(String),

    #[error("Storage IO error during {context}: {source}")]
    StorageIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::StorageIo {
            context: context.into(),
            source,
        }
    }

    /// Whether this error came from a storage backend (and may be retried).
    pub fn is_storage(&self) -> bool {
        matches!(self, EngineError::StorageIo { .. })
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EngineError>;
