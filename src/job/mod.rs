// src/job/mod.rs

//! Jobs: concrete instantiations of tasks with bound inputs.
//!
//! - [`graph`] builds and validates a graph of jobs.
//! - [`failure`] defines the failure values attached to job outcomes.

pub mod failure;
pub mod graph;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::task::Task;
use crate::value::Value;

pub use failure::{FailureKind, JobFailure};
pub use graph::JobGraph;

/// Index of a job inside one [`JobGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Identity of one submitted run. Time-ordered (UUID v7), so ids from
/// engines sharing a store do not collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        RunId(uuid::Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value bound to one task parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Literal(Value),
    /// The output of another job in the same graph (a dependency edge).
    Output(JobId),
}

impl Binding {
    pub fn literal(value: impl Into<Value>) -> Self {
        Binding::Literal(value.into())
    }

    pub fn output(job: JobId) -> Self {
        Binding::Output(job)
    }

    pub fn dependency(&self) -> Option<JobId> {
        match self {
            Binding::Output(job) => Some(*job),
            Binding::Literal(_) => None,
        }
    }
}

impl From<Value> for Binding {
    fn from(v: Value) -> Self {
        Binding::Literal(v)
    }
}

impl From<JobId> for Binding {
    fn from(job: JobId) -> Self {
        Binding::Output(job)
    }
}

impl From<i64> for Binding {
    fn from(v: i64) -> Self {
        Binding::Literal(Value::Int(v))
    }
}

impl From<i32> for Binding {
    fn from(v: i32) -> Self {
        Binding::Literal(Value::Int(v.into()))
    }
}

impl From<f64> for Binding {
    fn from(v: f64) -> Self {
        Binding::Literal(Value::Float(v))
    }
}

impl From<bool> for Binding {
    fn from(v: bool) -> Self {
        Binding::Literal(Value::Bool(v))
    }
}

impl From<&str> for Binding {
    fn from(v: &str) -> Self {
        Binding::Literal(Value::from(v))
    }
}

impl From<String> for Binding {
    fn from(v: String) -> Self {
        Binding::Literal(Value::Str(v))
    }
}

/// One validated job: a task plus a binding for each declared parameter.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: JobId,
    pub task: Arc<Task>,
    pub bindings: std::collections::BTreeMap<String, Binding>,
}

impl JobSpec {
    /// Jobs whose outputs this job consumes, deduplicated, in id order.
    pub fn dependencies(&self) -> Vec<JobId> {
        let mut deps: Vec<JobId> = self
            .bindings
            .values()
            .filter_map(Binding::dependency)
            .collect();
        deps.sort();
        deps.dedup();
        deps
    }
}
