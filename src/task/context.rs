// src/task/context.rs

//! What a compute function receives and returns.

use std::collections::BTreeMap;

use crate::fingerprint::Fingerprint;
use crate::job::JobFailure;
use crate::task::TaskId;
use crate::value::Value;

/// Resolved input values for one job attempt.
///
/// An input is `None` when it was bound to an upstream job that did not
/// succeed and the task tolerates failed dependencies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    values: BTreeMap<String, Option<Value>>,
}

impl Inputs {
    pub fn new(values: BTreeMap<String, Option<Value>>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(|v| v.as_ref())
    }

    /// `true` if the input is declared but its upstream job failed.
    pub fn is_absent(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(None))
    }

    pub fn require(&self, name: &str) -> Result<&Value, JobFailure> {
        self.get(name)
            .ok_or_else(|| JobFailure::logic(format!("input '{name}' is absent")))
    }

    pub fn int(&self, name: &str) -> Result<i64, JobFailure> {
        self.require(name)?
            .as_int()
            .ok_or_else(|| JobFailure::logic(format!("input '{name}' is not an int")))
    }

    pub fn number(&self, name: &str) -> Result<f64, JobFailure> {
        self.require(name)?
            .as_number()
            .ok_or_else(|| JobFailure::logic(format!("input '{name}' is not a number")))
    }

    pub fn str(&self, name: &str) -> Result<&str, JobFailure> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| JobFailure::logic(format!("input '{name}' is not a string")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }
}

/// Per-attempt context handed to a compute function.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub task: TaskId,
    pub fingerprint: Fingerprint,
    /// 1-based attempt number.
    pub attempt: u32,
    pub inputs: Inputs,
}

/// Value produced by a compute function, plus metadata to attach to the
/// artifact and the ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub value: Value,
    pub metadata: BTreeMap<String, Value>,
}

impl TaskOutput {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl From<Value> for TaskOutput {
    fn from(value: Value) -> Self {
        TaskOutput::new(value)
    }
}
