// src/config/validate.rs

use std::time::Duration;

use crate::cache::EvictionPolicy;
use crate::config::model::{EngineConfig, RawEngineConfig, StorageConfig};
use crate::errors::{EngineError, Result};
use crate::retry::{IoRetry, RetryPolicy};
use crate::types::{EvictionKind, StorageBackendKind};

impl TryFrom<RawEngineConfig> for EngineConfig {
    type Error = EngineError;

    fn try_from(raw: RawEngineConfig) -> std::result::Result<Self, Self::Error> {
        validate_engine_section(&raw)?;
        let retry = validate_retry_section(&raw)?;
        let storage = validate_storage_section(&raw)?;
        let eviction = validate_cache_section(&raw)?;

        Ok(EngineConfig::new_unchecked(
            raw.engine.workers,
            raw.engine.job_timeout_ms.map(Duration::from_millis),
            retry,
            storage,
            eviction,
        ))
    }
}

fn validate_engine_section(cfg: &RawEngineConfig) -> Result<()> {
    if cfg.engine.workers == 0 {
        return Err(EngineError::Config(
            "[engine].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.engine.job_timeout_ms == Some(0) {
        return Err(EngineError::Config(
            "[engine].job_timeout_ms must be > 0 when set".to_string(),
        ));
    }
    Ok(())
}

fn validate_retry_section(cfg: &RawEngineConfig) -> Result<RetryPolicy> {
    let r = &cfg.retry;
    if !r.multiplier.is_finite() || r.multiplier < 1.0 {
        return Err(EngineError::Config(format!(
            "[retry].multiplier must be >= 1.0 (got {})",
            r.multiplier
        )));
    }
    if r.base_delay_ms > r.max_delay_ms {
        return Err(EngineError::Config(format!(
            "[retry].base_delay_ms ({}) must not exceed max_delay_ms ({})",
            r.base_delay_ms, r.max_delay_ms
        )));
    }
    Ok(RetryPolicy {
        max_retries: r.max_retries,
        base_delay: Duration::from_millis(r.base_delay_ms),
        max_delay: Duration::from_millis(r.max_delay_ms),
        multiplier: r.multiplier,
    })
}

fn validate_storage_section(cfg: &RawEngineConfig) -> Result<StorageConfig> {
    let s = &cfg.storage;
    if s.backend == StorageBackendKind::Filesystem && s.root.is_none() {
        return Err(EngineError::Config(
            "[storage].root is required when backend = \"filesystem\"".to_string(),
        ));
    }
    Ok(StorageConfig {
        backend: s.backend,
        root: s.root.clone(),
        io: IoRetry::new(s.io_retries),
    })
}

fn validate_cache_section(cfg: &RawEngineConfig) -> Result<EvictionPolicy> {
    let c = &cfg.cache;
    match c.eviction {
        EvictionKind::None => Ok(EvictionPolicy::None),
        EvictionKind::Lru => match c.max_entries {
            Some(n) if n > 0 => Ok(EvictionPolicy::Lru { max_entries: n }),
            _ => Err(EngineError::Config(
                "[cache].max_entries must be set and > 0 when eviction = \"lru\"".to_string(),
            )),
        },
        EvictionKind::Age => match c.max_age_secs {
            Some(secs) if secs > 0 => Ok(EvictionPolicy::Age {
                max_age: Duration::from_secs(secs),
            }),
            _ => Err(EngineError::Config(
                "[cache].max_age_secs must be set and > 0 when eviction = \"age\"".to_string(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<EngineConfig> {
        EngineConfig::from_toml_str(toml_src)
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.storage.backend, StorageBackendKind::Memory);
        assert_eq!(cfg.storage.io.retries, 3);
        assert_eq!(cfg.eviction, EvictionPolicy::None);
        assert_eq!(cfg.job_timeout, None);
    }

    #[test]
    fn full_config_round_trips_into_typed_values() {
        let cfg = parse(
            r#"
            [engine]
            workers = 2
            job_timeout_ms = 1500

            [retry]
            max_retries = 5
            base_delay_ms = 10
            max_delay_ms = 80
            multiplier = 3.0

            [storage]
            backend = "filesystem"
            root = "/tmp/memodag"
            io_retries = 1

            [cache]
            eviction = "lru"
            max_entries = 16
            "#,
        )
        .unwrap();
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.job_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.retry.delay_for(2), Duration::from_millis(30));
        assert_eq!(cfg.storage.root.as_deref(), Some(std::path::Path::new("/tmp/memodag")));
        assert_eq!(cfg.eviction, EvictionPolicy::Lru { max_entries: 16 });
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            "[engine]\nworkers = 0",
            "[retry]\nmultiplier = 0.5",
            "[retry]\nbase_delay_ms = 100\nmax_delay_ms = 10",
            "[storage]\nbackend = \"filesystem\"",
            "[cache]\neviction = \"lru\"",
            "[cache]\neviction = \"age\"\nmax_age_secs = 0",
        ];
        for src in cases {
            let err = parse(src).unwrap_err();
            assert!(matches!(err, EngineError::Config(_)), "{src}: {err}");
        }
    }

    #[test]
    fn unknown_keys_are_toml_errors() {
        let err = parse("[engine]\nworkerz = 3").unwrap_err();
        assert!(matches!(err, EngineError::Toml(_)));
        let err = parse("[storage]\nbackend = \"s3\"").unwrap_err();
        assert!(matches!(err, EngineError::Toml(_)));
    }
}
