// src/fingerprint.rs

//! Content fingerprints for jobs.
//!
//! A fingerprint is a blake3 digest over the task identity and the canonical
//! encoding of the job's resolved inputs. Job-valued inputs contribute the
//! upstream job's fingerprint rather than its output, so a whole graph can be
//! fingerprinted before anything runs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use blake3::Hasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{EngineError, Result};
use crate::task::Task;
use crate::value::{Value, write_len_prefixed};

/// Domain separation for the digest; bump when the encoding changes.
const FINGERPRINT_DOMAIN: &[u8] = b"memodag.fingerprint.v1";

const INPUT_LITERAL: u8 = b'L';
const INPUT_DEPENDENCY: u8 = b'D';
const INPUT_ABSENT: u8 = b'A';

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let hash = blake3::Hash::from_hex(s.trim())
            .map_err(|e| EngineError::Serialization(format!("invalid fingerprint {s:?}: {e}")))?;
        Ok(Self(*hash.as_bytes()))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An input as seen by the fingerprint: either a literal, the fingerprint of
/// the upstream job that produces it, or absent (a failed dependency of a
/// job that tolerates failures).
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedInput {
    Literal(Value),
    Dependency(Fingerprint),
    Absent,
}

/// Compute the fingerprint of `task` applied to `inputs`.
///
/// Pure: the result depends only on the task identity and the inputs, and
/// `BTreeMap` iteration makes it independent of binding order.
pub fn fingerprint(task: &Task, inputs: &BTreeMap<String, ResolvedInput>) -> Result<Fingerprint> {
    let mut buf = Vec::with_capacity(128);
    write_len_prefixed(&mut buf, FINGERPRINT_DOMAIN);

    let id = task.id();
    write_len_prefixed(&mut buf, id.name.as_bytes());
    buf.extend_from_slice(&id.version.to_be_bytes());
    write_len_prefixed(&mut buf, task.compute_ref().as_bytes());

    buf.extend_from_slice(&(inputs.len() as u64).to_be_bytes());
    for (name, input) in inputs {
        write_len_prefixed(&mut buf, name.as_bytes());
        match input {
            ResolvedInput::Literal(value) => {
                buf.push(INPUT_LITERAL);
                value.encode_canonical(&mut buf).map_err(|e| match e {
                    EngineError::Serialization(msg) => EngineError::Serialization(format!(
                        "task '{id}', input '{name}': {msg}"
                    )),
                    other => other,
                })?;
            }
            ResolvedInput::Dependency(fp) => {
                buf.push(INPUT_DEPENDENCY);
                buf.extend_from_slice(fp.as_bytes());
            }
            ResolvedInput::Absent => buf.push(INPUT_ABSENT),
        }
    }

    let mut hasher = Hasher::new();
    hasher.update(&buf);
    Ok(Fingerprint(*hasher.finalize().as_bytes()))
}
