use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a job does when one of its dependencies did not succeed.
///
/// - `Propagate`: the job is marked `Skipped` (default).
/// - `Tolerate`: the job still runs once all dependencies are terminal; inputs
///   bound to failed dependencies are passed as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    Propagate,
    Tolerate,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Propagate
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "propagate" => Ok(FailurePolicy::Propagate),
            "tolerate" => Ok(FailurePolicy::Tolerate),
            other => Err(format!(
                "invalid failure policy: {other} (expected \"propagate\" or \"tolerate\")"
            )),
        }
    }
}

/// Which storage backend the engine persists artifacts and datasets to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// Everything in process memory (lost on restart).
    Memory,
    /// Artifacts as files and the ledger as JSON lines under `storage.root`.
    Filesystem,
}

impl Default for StorageBackendKind {
    fn default() -> Self {
        StorageBackendKind::Memory
    }
}

/// Eviction mode for the cache's in-memory index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionKind {
    None,
    Lru,
    Age,
}

impl Default for EvictionKind {
    fn default() -> Self {
        EvictionKind::None
    }
}

impl FromStr for EvictionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(EvictionKind::None),
            "lru" => Ok(EvictionKind::Lru),
            "age" => Ok(EvictionKind::Age),
            other => Err(format!(
                "invalid eviction mode: {other} (expected \"none\", \"lru\" or \"age\")"
            )),
        }
    }
}
