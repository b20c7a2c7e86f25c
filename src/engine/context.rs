// src/engine/context.rs

//! The `Engine`: task registry, cache and ledger, plus run submission.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cache::Cache;
use crate::config::{load_and_validate, EngineConfig};
use crate::dag::Scheduler;
use crate::database::{Database, Query, Rows};
use crate::errors::{EngineError, Result};
use crate::exec::CacheExecutor;
use crate::fingerprint::{fingerprint, Fingerprint, ResolvedInput};
use crate::job::{Binding, JobGraph, JobId, RunId};
use crate::storage::{
    ArtifactStore, FsArtifactStore, FsRecordStore, MemoryArtifactStore, MemoryRecordStore,
    RecordStore,
};
use crate::task::{Task, TaskRegistry};
use crate::types::StorageBackendKind;

use super::core::CoreRuntime;
use super::handle::RunHandle;
use super::report::RunReport;
use super::runtime::{RunContext, Runtime};

/// Explicit engine context. Engines are independent of each other unless
/// they share stores (for example the same filesystem root).
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    registry: RwLock<TaskRegistry>,
    cache: Cache,
    database: Database,
}

impl Engine {
    /// Build an engine with the stores selected by `config.storage`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let (artifacts, records): (Arc<dyn ArtifactStore>, Arc<dyn RecordStore>) =
            match config.storage.backend {
                StorageBackendKind::Memory => (
                    Arc::new(MemoryArtifactStore::new()),
                    Arc::new(MemoryRecordStore::new()),
                ),
                StorageBackendKind::Filesystem => {
                    let Some(root) = config.storage.root.as_deref() else {
                        return Err(EngineError::Config(
                            "filesystem storage requires a root directory".to_string(),
                        ));
                    };
                    info!(root = %root.display(), "using filesystem storage");
                    (
                        Arc::new(FsArtifactStore::new(root)?),
                        Arc::new(FsRecordStore::new(root)?),
                    )
                }
            };
        Ok(Self::with_stores(config, artifacts, records))
    }

    /// Build an engine over caller-provided stores; `config.storage.backend`
    /// and `root` are ignored.
    pub fn with_stores(
        config: EngineConfig,
        artifacts: Arc<dyn ArtifactStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let cache = Cache::new(artifacts, config.eviction, config.storage.io);
        let database = Database::new(records, config.storage.io);
        Self {
            config,
            registry: RwLock::new(TaskRegistry::new()),
            cache,
            database,
        }
    }

    /// Load, validate and apply a TOML config file.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(load_and_validate(path)?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn register_task(&self, task: Task) -> Result<Arc<Task>> {
        self.registry.write().register(task)
    }

    pub fn task(&self, name: &str, version: u32) -> Result<Arc<Task>> {
        self.registry.read().lookup(name, version)
    }

    /// Submit a single job.
    pub fn submit<S, B, I>(&self, task: &Arc<Task>, bindings: I) -> Result<RunHandle>
    where
        S: Into<String>,
        B: Into<Binding>,
        I: IntoIterator<Item = (S, B)>,
    {
        let mut graph = JobGraph::new();
        graph.add(task, bindings)?;
        self.submit_graph(graph)
    }

    /// Validate, fingerprint and start a job graph. The run's target is the
    /// job added last.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_graph(&self, graph: JobGraph) -> Result<RunHandle> {
        let Some(target) = graph.target() else {
            return Err(EngineError::EmptyGraph);
        };
        let order = graph.topological_order()?;

        {
            let registry = self.registry.read();
            if let Some(job) = graph.jobs().iter().find(|j| !registry.is_registered(&j.task)) {
                return Err(EngineError::TaskNotFound(job.task.id().to_string()));
            }
        }

        let fingerprints = fingerprint_graph(&graph, &order)?;
        let run_id = RunId::new();
        info!(
            %run_id,
            jobs = graph.len(),
            %target,
            fingerprint = %fingerprints[target.0].short(),
            "submitting run"
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let core = CoreRuntime::new(
            Scheduler::new(&graph, self.config.retry.clone()),
            self.config.workers,
        );
        let executor = CacheExecutor::new(self.cache.clone(), self.database.clone(), events_tx.clone());
        let ctx = RunContext {
            run_id,
            graph,
            fingerprints,
            db: self.database.clone(),
            job_timeout: self.config.job_timeout,
        };
        let runtime = Runtime::new(core, ctx, events_rx, events_tx.clone(), executor);
        let join = tokio::spawn(runtime.run());

        Ok(RunHandle::new(run_id, target, events_tx, join))
    }

    /// Wait for a submitted run to finish.
    pub async fn await_result(&self, handle: RunHandle) -> Result<RunReport> {
        handle.wait().await
    }

    pub fn query(&self, query: Query) -> Rows {
        self.database.query(query)
    }
}

/// Fingerprint every job, dependencies first.
fn fingerprint_graph(graph: &JobGraph, order: &[JobId]) -> Result<Vec<Fingerprint>> {
    let mut fps: Vec<Option<Fingerprint>> = vec![None; graph.len()];

    for &id in order {
        let spec = graph.job(id)?;
        let mut resolved = BTreeMap::new();
        for (name, binding) in &spec.bindings {
            let input = match binding {
                Binding::Literal(value) => ResolvedInput::Literal(value.clone()),
                Binding::Output(dep) => {
                    let Some(fp) = fps.get(dep.0).copied().flatten() else {
                        return Err(EngineError::UnknownJob(*dep));
                    };
                    ResolvedInput::Dependency(fp)
                }
            };
            resolved.insert(name.clone(), input);
        }
        let fp = fingerprint(&spec.task, &resolved)?;
        debug!(job = %id, task = %spec.task.id(), fingerprint = %fp.short(), "fingerprinted job");
        fps[id.0] = Some(fp);
    }

    fps.into_iter()
        .enumerate()
        .map(|(i, fp)| fp.ok_or(EngineError::UnknownJob(JobId(i))))
        .collect()
}
