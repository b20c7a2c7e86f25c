// src/task/mod.rs

//! Task definitions and the task registry.
//!
//! - [`Task`] is an immutable, versioned description of a computation.
//! - [`context`] holds what a compute function sees at run time.
//! - [`registry`] maps `(name, version)` to registered tasks.

pub mod context;
pub mod registry;

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};
use crate::job::JobFailure;
use crate::types::FailurePolicy;
use crate::value::ValueType;

pub use context::{Inputs, JobContext, TaskOutput};
pub use registry::TaskRegistry;

/// Future returned by a compute function.
pub type ComputeFuture = Pin<Box<dyn Future<Output = std::result::Result<TaskOutput, JobFailure>> + Send>>;

/// Type-erased compute function.
pub type ComputeFn = Arc<dyn Fn(JobContext) -> ComputeFuture + Send + Sync>;

/// Registry key of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    pub name: String,
    pub version: u32,
}

impl TaskId {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A declared input parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputParam {
    pub name: String,
    pub ty: ValueType,
}

#[derive(Clone)]
pub struct Task {
    id: TaskId,
    compute_ref: String,
    inputs: Vec<InputParam>,
    output: ValueType,
    failure_policy: FailurePolicy,
    idempotent: bool,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    compute: ComputeFn,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("compute_ref", &self.compute_ref)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .field("failure_policy", &self.failure_policy)
            .field("idempotent", &self.idempotent)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn builder(name: impl Into<String>, version: u32) -> TaskBuilder {
        TaskBuilder::new(name, version)
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn version(&self) -> u32 {
        self.id.version
    }

    pub fn compute_ref(&self) -> &str {
        &self.compute_ref
    }

    pub fn inputs(&self) -> &[InputParam] {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&InputParam> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self) -> ValueType {
        self.output
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Whether logic failures of this task may be retried.
    pub fn idempotent(&self) -> bool {
        self.idempotent
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    pub(crate) fn invoke(&self, ctx: JobContext) -> ComputeFuture {
        (self.compute)(ctx)
    }

    /// Two tasks have the same specification when everything except the
    /// compute closure itself matches.
    pub fn same_spec(&self, other: &Task) -> bool {
        self.id == other.id
            && self.compute_ref == other.compute_ref
            && self.inputs == other.inputs
            && self.output == other.output
            && self.failure_policy == other.failure_policy
            && self.idempotent == other.idempotent
            && self.timeout == other.timeout
            && self.max_retries == other.max_retries
    }
}

/// Builder for [`Task`].
pub struct TaskBuilder {
    id: TaskId,
    compute_ref: Option<String>,
    inputs: Vec<InputParam>,
    output: ValueType,
    failure_policy: FailurePolicy,
    idempotent: bool,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    compute: Option<ComputeFn>,
}

impl TaskBuilder {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            id: TaskId::new(name, version),
            compute_ref: None,
            inputs: Vec::new(),
            output: ValueType::Any,
            failure_policy: FailurePolicy::default(),
            idempotent: false,
            timeout: None,
            max_retries: None,
            compute: None,
        }
    }

    pub fn input(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.inputs.push(InputParam {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn output(mut self, ty: ValueType) -> Self {
        self.output = ty;
        self
    }

    /// Stable name of the compute implementation. Part of the task identity
    /// and the fingerprint; defaults to the task name.
    pub fn compute_ref(mut self, compute_ref: impl Into<String>) -> Self {
        self.compute_ref = Some(compute_ref.into());
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn compute<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TaskOutput, JobFailure>> + Send + 'static,
    {
        let compute: ComputeFn = Arc::new(move |ctx: JobContext| -> ComputeFuture { Box::pin(f(ctx)) });
        self.compute = Some(compute);
        self
    }

    pub fn build(self) -> Result<Task> {
        if self.id.name.trim().is_empty() {
            return Err(EngineError::InvalidTask("task name must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for param in &self.inputs {
            if !seen.insert(param.name.as_str()) {
                return Err(EngineError::InvalidTask(format!(
                    "task '{}' declares input '{}' more than once",
                    self.id, param.name
                )));
            }
        }

        let compute = self.compute.ok_or_else(|| {
            EngineError::InvalidTask(format!("task '{}' has no compute function", self.id))
        })?;

        Ok(Task {
            compute_ref: self.compute_ref.unwrap_or_else(|| self.id.name.clone()),
            id: self.id,
            inputs: self.inputs,
            output: self.output,
            failure_policy: self.failure_policy,
            idempotent: self.idempotent,
            timeout: self.timeout,
            max_retries: self.max_retries,
            compute,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn builder_rejects_duplicate_inputs() {
        let res = Task::builder("t", 1)
            .input("x", ValueType::Int)
            .input("x", ValueType::Str)
            .compute(|_| async { Ok(TaskOutput::new(Value::Null)) })
            .build();
        assert!(matches!(res, Err(EngineError::InvalidTask(_))));
    }

    #[test]
    fn builder_requires_compute() {
        let res = Task::builder("t", 1).build();
        assert!(matches!(res, Err(EngineError::InvalidTask(msg)) if msg.contains("compute")));
    }

    #[test]
    fn compute_ref_defaults_to_name() {
        let task = Task::builder("double", 3)
            .compute(|_| async { Ok(TaskOutput::new(Value::Null)) })
            .build()
            .unwrap();
        assert_eq!(task.compute_ref(), "double");
        assert_eq!(task.id().to_string(), "double@3");
    }
}
