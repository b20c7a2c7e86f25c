// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{EngineConfig, RawEngineConfig};
use crate::errors::{EngineError, Result};

/// Environment variable naming a config file, used by [`default_config_path`].
pub const CONFIG_ENV_VAR: &str = "MEMODAG_CONFIG";

/// Load a configuration file from a given path and return the raw `RawEngineConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawEngineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        EngineError::Config(format!("reading config file {}: {e}", path.display()))
    })?;

    let config: RawEngineConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks value ranges and cross-field requirements.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let raw_config = load_from_path(&path)?;
    let config = EngineConfig::try_from(raw_config)?;
    Ok(config)
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawEngineConfig = toml::from_str(contents)?;
        EngineConfig::try_from(raw)
    }
}

/// `$MEMODAG_CONFIG` if set, else `memodag.toml` in the current directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("memodag.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nworkers = 3").unwrap();
        let cfg = load_and_validate(file.path()).unwrap();
        assert_eq!(cfg.workers, 3);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_from_path("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
