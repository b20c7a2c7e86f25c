// src/retry.rs

//! Backoff policies.
//!
//! - [`RetryPolicy`] governs job retries after a retryable failure.
//! - [`IoRetry`] wraps blocking storage calls with a small bounded retry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::time::sleep;
use tracing::warn;

use crate::errors::{EngineError, Result};

/// Exponential backoff for job retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(63) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exp);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

/// Bounded retry for storage backend calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IoRetry {
    /// Retries after the first failing call.
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for IoRetry {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(10),
        }
    }
}

impl IoRetry {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    /// Run a blocking storage operation on the blocking pool.
    ///
    /// Only `StorageIo` errors are retried; anything else is returned as is.
    pub async fn run_blocking<T, F>(&self, what: &'static str, op: F) -> Result<T>
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let op = Arc::new(op);
        let mut attempt = 0u32;
        let mut delay = self.base_delay;

        loop {
            let call = Arc::clone(&op);
            let result = tokio::task::spawn_blocking(move || call())
                .await
                .map_err(|e| EngineError::Other(anyhow!("{what}: blocking task failed: {e}")))?;

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_storage() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        operation = what,
                        attempt,
                        retries = self.retries,
                        error = %err,
                        "storage call failed; retrying in {:?}",
                        delay
                    );
                    sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
