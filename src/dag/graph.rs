// src/dag/graph.rs

use crate::job::{JobGraph, JobId};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Jobs whose outputs this job consumes.
    deps: Vec<JobId>,
    /// Jobs that consume this job's output.
    dependents: Vec<JobId>,
}

/// Adjacency view of a [`JobGraph`], indexed by `JobId`.
///
/// Acyclicity is checked by `JobGraph::validate`; this only keeps the edges
/// needed for scheduling.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: Vec<DagNode>,
}

impl DagGraph {
    pub fn from_jobs(graph: &JobGraph) -> Self {
        let mut nodes: Vec<DagNode> = graph
            .jobs()
            .iter()
            .map(|job| DagNode {
                deps: job.dependencies(),
                dependents: Vec::new(),
            })
            .collect();

        for job in graph.jobs() {
            for dep in job.dependencies() {
                if let Some(node) = nodes.get_mut(dep.0) {
                    node.dependents.push(job.id);
                }
            }
        }

        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn jobs(&self) -> impl Iterator<Item = JobId> + '_ {
        (0..self.nodes.len()).map(JobId)
    }

    pub fn dependencies_of(&self, job: JobId) -> &[JobId] {
        self.nodes
            .get(job.0)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, job: JobId) -> &[JobId] {
        self.nodes
            .get(job.0)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}
