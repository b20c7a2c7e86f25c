// src/cache/artifact.rs

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::ArtifactRef;
use crate::errors::{EngineError, Result};
use crate::fingerprint::Fingerprint;
use crate::task::TaskOutput;
use crate::value::Value;

/// A committed job result. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub fingerprint: Fingerprint,
    pub value: Value,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    /// Compute time of the job that produced it.
    pub cost_ms: u64,
    /// Size of the stored encoding in bytes; filled in on encode/decode.
    #[serde(skip)]
    pub size: u64,
}

impl Artifact {
    pub fn new(fingerprint: Fingerprint, output: TaskOutput, cost: Duration) -> Self {
        Self {
            fingerprint,
            value: output.value,
            metadata: output.metadata,
            created_at: Utc::now(),
            cost_ms: cost.as_millis() as u64,
            size: 0,
        }
    }

    /// Store key for a fingerprint.
    pub fn key_for(fingerprint: &Fingerprint) -> String {
        fingerprint.to_hex()
    }

    pub fn key(&self) -> String {
        Self::key_for(&self.fingerprint)
    }

    pub fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef {
            key: self.key(),
            size: self.size,
        }
    }

    /// Encode for the store and record the encoded size.
    pub(crate) fn encode(&mut self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(&*self)?;
        self.size = bytes.len() as u64;
        Ok(bytes)
    }

    /// Decode stored bytes, checking they belong to `expected`.
    pub(crate) fn decode(expected: &Fingerprint, bytes: &[u8]) -> Result<Self> {
        let mut artifact: Artifact = serde_json::from_slice(bytes)?;
        if artifact.fingerprint != *expected {
            return Err(EngineError::Serialization(format!(
                "artifact stored under {} carries fingerprint {}",
                expected, artifact.fingerprint
            )));
        }
        artifact.size = bytes.len() as u64;
        Ok(artifact)
    }
}
