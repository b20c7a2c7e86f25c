// src/job/graph.rs

//! Construction and validation of job graphs.

use std::collections::BTreeMap;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{EngineError, Result};
use crate::job::{Binding, JobId, JobSpec};
use crate::task::Task;
use crate::value::ValueType;

/// A set of jobs and the dependency edges implied by their bindings.
///
/// Jobs can only reference jobs that were added before them, so a graph
/// built through [`JobGraph::add`] is acyclic by construction;
/// [`JobGraph::validate`] still checks it before scheduling.
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    jobs: Vec<JobSpec>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job binding `task`'s parameters.
    ///
    /// Fails with:
    /// - `Arity` if a declared parameter is unbound, bound twice, or a
    ///   binding names a parameter the task does not declare
    /// - `TypeMismatch` if a literal, or an upstream job's declared output,
    ///   does not fit the parameter's type
    /// - `UnknownJob` if a binding references a job not in this graph
    pub fn add<S, B, I>(&mut self, task: &Arc<Task>, bindings: I) -> Result<JobId>
    where
        S: Into<String>,
        B: Into<Binding>,
        I: IntoIterator<Item = (S, B)>,
    {
        let mut bound: BTreeMap<String, Binding> = BTreeMap::new();

        for (name, binding) in bindings {
            let name = name.into();
            let binding = binding.into();

            let Some(param) = task.input(&name) else {
                return Err(EngineError::Arity {
                    task: task.id().clone(),
                    detail: format!("unknown parameter '{name}'"),
                });
            };

            match &binding {
                Binding::Literal(value) => {
                    if !param.ty.accepts(value) {
                        return Err(EngineError::TypeMismatch {
                            task: task.id().clone(),
                            param: name,
                            expected: param.ty.to_string(),
                            found: value.value_type().to_string(),
                        });
                    }
                }
                Binding::Output(upstream) => {
                    let upstream_task = &self.job(*upstream)?.task;
                    let produced = upstream_task.output();
                    // `Any` outputs are checked when the value arrives.
                    if produced != ValueType::Any && !param.ty.accepts_type(produced) {
                        return Err(EngineError::TypeMismatch {
                            task: task.id().clone(),
                            param: name,
                            expected: param.ty.to_string(),
                            found: format!("{produced} (output of {})", upstream_task.id()),
                        });
                    }
                }
            }

            if bound.insert(name.clone(), binding).is_some() {
                return Err(EngineError::Arity {
                    task: task.id().clone(),
                    detail: format!("parameter '{name}' bound more than once"),
                });
            }
        }

        let missing: Vec<&str> = task
            .inputs()
            .iter()
            .filter(|p| !bound.contains_key(&p.name))
            .map(|p| p.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::Arity {
                task: task.id().clone(),
                detail: format!(
                    "expected {} parameter(s), missing {:?}",
                    task.inputs().len(),
                    missing
                ),
            });
        }

        let id = JobId(self.jobs.len());
        self.jobs.push(JobSpec {
            id,
            task: Arc::clone(task),
            bindings: bound,
        });
        Ok(id)
    }

    pub fn job(&self, id: JobId) -> Result<&JobSpec> {
        self.jobs.get(id.0).ok_or(EngineError::UnknownJob(id))
    }

    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// The job added last; reported as the run's target.
    pub fn target(&self) -> Option<JobId> {
        self.jobs.last().map(|j| j.id)
    }

    /// Check that every edge points at a known job and that the graph has
    /// no cycle.
    pub fn validate(&self) -> Result<()> {
        self.topological_order().map(|_| ())
    }

    /// Jobs ordered so that every job comes after all of its dependencies.
    pub fn topological_order(&self) -> Result<Vec<JobId>> {
        // Edge direction: dependency -> dependent.
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();

        for job in &self.jobs {
            graph.add_node(job.id.0);
        }
        for job in &self.jobs {
            for dep in job.dependencies() {
                if dep.0 >= self.jobs.len() {
                    return Err(EngineError::UnknownJob(dep));
                }
                graph.add_edge(dep.0, job.id.0, ());
            }
        }

        toposort(&graph, None)
            .map(|order| order.into_iter().map(JobId).collect())
            .map_err(|cycle| {
                let node = JobId(cycle.node_id());
                let task = self
                    .jobs
                    .get(node.0)
                    .map(|j| j.task.id().to_string())
                    .unwrap_or_default();
                EngineError::DagCycle(format!("cycle detected involving {node} ({task})"))
            })
    }
}
