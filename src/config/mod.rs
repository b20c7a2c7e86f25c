// src/config/mod.rs

//! Engine configuration.
//!
//! - [`model`] holds the raw TOML mapping and the validated config.
//! - [`validate`] converts one into the other.
//! - [`loader`] reads files.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{EngineConfig, RawEngineConfig, StorageConfig};
