// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::EvictionPolicy;
use crate::retry::{IoRetry, RetryPolicy};
use crate::types::{EvictionKind, StorageBackendKind};

/// Engine configuration as read from a TOML file.
///
/// ```toml
/// [engine]
/// workers = 4
/// job_timeout_ms = 30000
///
/// [retry]
/// max_retries = 2
/// base_delay_ms = 50
/// max_delay_ms = 5000
/// multiplier = 2.0
///
/// [storage]
/// backend = "filesystem"
/// root = ".memodag"
/// io_retries = 3
///
/// [cache]
/// eviction = "lru"
/// max_entries = 1024
/// ```
///
/// All sections are optional and have reasonable defaults. Convert to a
/// validated [`EngineConfig`] with `EngineConfig::try_from`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub cache: CacheSection,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Maximum number of jobs running at once.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Default per-job timeout; tasks may override it. No timeout if unset.
    #[serde(default)]
    pub job_timeout_ms: Option<u64>,
}

fn default_workers() -> usize {
    4
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            job_timeout_ms: None,
        }
    }
}

/// `[retry]` section: job retries after retryable failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(default)]
    pub backend: StorageBackendKind,

    /// Required for the filesystem backend.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Retries for a failing storage call before it surfaces as an error.
    #[serde(default = "default_io_retries")]
    pub io_retries: u32,
}

fn default_io_retries() -> u32 {
    3
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::default(),
            root: None,
            io_retries: default_io_retries(),
        }
    }
}

/// `[cache]` section: eviction of the in-memory index.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    #[serde(default)]
    pub eviction: EvictionKind,
    /// For `eviction = "lru"`.
    #[serde(default)]
    pub max_entries: Option<usize>,
    /// For `eviction = "age"`.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

/// Storage settings after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    /// Always set for the filesystem backend.
    pub root: Option<PathBuf>,
    pub io: IoRetry,
}

/// Validated engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub workers: usize,
    pub job_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    pub storage: StorageConfig,
    pub eviction: EvictionPolicy,
}

impl EngineConfig {
    /// Constructed by validation in `config::validate`.
    pub(crate) fn new_unchecked(
        workers: usize,
        job_timeout: Option<Duration>,
        retry: RetryPolicy,
        storage: StorageConfig,
        eviction: EvictionPolicy,
    ) -> Self {
        Self {
            workers,
            job_timeout,
            retry,
            storage,
            eviction,
        }
    }

    /// In-memory storage, no eviction, default retry policy.
    pub fn in_memory() -> Self {
        Self {
            workers: default_workers(),
            job_timeout: None,
            retry: RetryPolicy::default(),
            storage: StorageConfig {
                backend: StorageBackendKind::Memory,
                root: None,
                io: IoRetry::new(default_io_retries()),
            },
            eviction: EvictionPolicy::None,
        }
    }

    /// Filesystem storage under `root`, otherwise defaults.
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::in_memory();
        cfg.storage.backend = StorageBackendKind::Filesystem;
        cfg.storage.root = Some(root.into());
        cfg
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn with_io_retry(mut self, io: IoRetry) -> Self {
        self.storage.io = io;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
