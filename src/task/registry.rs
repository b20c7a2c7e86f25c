// src/task/registry.rs

//! Typed task registry keyed by `(name, version)`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{EngineError, Result};
use crate::task::{Task, TaskId};

/// Registered tasks, owned by an [`crate::engine::Engine`].
///
/// Lookups are explicit and fail fast; registration of a second, different
/// task under an existing `(name, version)` is rejected.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, Arc<Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task.
    ///
    /// Re-registering an identical specification returns the task already
    /// registered, so callers can register idempotently at startup.
    pub fn register(&mut self, task: Task) -> Result<Arc<Task>> {
        if let Some(existing) = self.tasks.get(task.id()) {
            if existing.same_spec(&task) {
                debug!(task = %task.id(), "task already registered with identical spec");
                return Ok(Arc::clone(existing));
            }
            return Err(EngineError::DuplicateTask(task.id().clone()));
        }

        let id = task.id().clone();
        let task = Arc::new(task);
        self.tasks.insert(id.clone(), Arc::clone(&task));
        info!(task = %id, inputs = task.inputs().len(), "registered task");
        Ok(task)
    }

    pub fn lookup(&self, name: &str, version: u32) -> Result<Arc<Task>> {
        self.tasks
            .get(&TaskId::new(name, version))
            .cloned()
            .ok_or_else(|| EngineError::TaskNotFound(format!("{name}@{version}")))
    }

    /// Highest registered version of `name`.
    pub fn latest(&self, name: &str) -> Result<Arc<Task>> {
        self.tasks
            .values()
            .filter(|t| t.name() == name)
            .max_by_key(|t| t.version())
            .cloned()
            .ok_or_else(|| EngineError::TaskNotFound(name.to_string()))
    }

    /// Whether `task` is the task registered under its id (or an identical
    /// specification of it).
    pub fn is_registered(&self, task: &Task) -> bool {
        self.tasks
            .get(task.id())
            .is_some_and(|registered| registered.same_spec(task))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskOutput;
    use crate::value::{Value, ValueType};

    fn task(name: &str, version: u32, output: ValueType) -> Task {
        Task::builder(name, version)
            .input("x", ValueType::Int)
            .output(output)
            .compute(|_| async { Ok(TaskOutput::new(Value::Null)) })
            .build()
            .unwrap()
    }

    #[test]
    fn identical_registration_is_idempotent() {
        let mut reg = TaskRegistry::new();
        let a = reg.register(task("double", 1, ValueType::Int)).unwrap();
        let b = reg.register(task("double", 1, ValueType::Int)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn conflicting_registration_is_rejected() {
        let mut reg = TaskRegistry::new();
        reg.register(task("double", 1, ValueType::Int)).unwrap();
        let err = reg.register(task("double", 1, ValueType::Float)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTask(id) if id == TaskId::new("double", 1)));
    }

    #[test]
    fn lookup_and_latest() {
        let mut reg = TaskRegistry::new();
        reg.register(task("double", 1, ValueType::Int)).unwrap();
        reg.register(task("double", 2, ValueType::Int)).unwrap();
        assert_eq!(reg.lookup("double", 1).unwrap().version(), 1);
        assert_eq!(reg.latest("double").unwrap().version(), 2);
        assert!(matches!(
            reg.lookup("double", 9),
            Err(EngineError::TaskNotFound(_))
        ));
    }
}
