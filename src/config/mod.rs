//! Configuration management for the engine
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. One section of a TOML configuration file
//! 3. Environment variables
//!
//! # Sections
//!
//! A config file holds one top-level table per section, and the `--section`
//! flag picks which one is used:
//!
//! ```toml
//! [default.logging]
//! log_file = "engine.log"
//!
//! [lab.storage]
//! provider = "s3"
//! endpoint = "http://localhost:9000"
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `ENGINE__<section>__<key>`, for example
//! `ENGINE__SERVER__BIND_ADDR=0.0.0.0:9000` or
//! `ENGINE__RUNTIME__WORKERS__TEXT_LOG__IMAGE=thoth/nlp:dev`.
//! S3 credentials are only read from `S3_ACCESS_KEY` / `S3_SECRET_KEY`
//! (or the AWS equivalents).

mod models;
mod sources;
mod validation;

pub use models::{
    Config, FetchConfig, LoggingConfig, RuntimeConfig, RuntimeProvider, ServerConfig, StorageConfig,
    StorageProvider, WorkerConfig, WorkersConfig,
};
pub use sources::{DEFAULT_CONFIG_PATH, DEFAULT_SECTION, resolve_path};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load a section from the given file (or `ENGINE_CONFIG`, or the default
    /// path), apply `.env` and environment overrides, then validate.
    pub fn load(path: Option<PathBuf>, section: &str) -> Result<Self, ConfigError> {
        let config = sources::load(resolve_path(path), section)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load a section from a specific path without reading `.env` or secrets
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf, section: &str) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path, section)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Binds across all workers that expose the host runtime socket
    pub fn socket_binds(&self) -> Vec<(&str, &str)> {
        self.runtime
            .workers
            .iter()
            .flat_map(|(_, worker)| {
                worker
                    .binds
                    .iter()
                    .filter(|bind| validation::exposes_socket(bind, &self.runtime.socket))
                    .map(move |bind| (worker.container.as_str(), bind.as_str()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("engine.toml");

        let toml_content = r#"
[default.fetch]
base_url = "http://collector.local:8880"
download_dir = "/tmp/incoming"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path, DEFAULT_SECTION).unwrap();
        assert_eq!(config.fetch.base_url, "http://collector.local:8880");
        assert_eq!(config.fetch.download_dir, PathBuf::from("/tmp/incoming"));
    }

    #[test]
    fn test_validation_catches_socket_mount() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("engine.toml");

        let toml_content = r#"
[default.runtime.workers.network_capture]
container = "autoencoders"
image = "thoth/ae:latest"
binds = ["/var/run:/var/run"]
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path, DEFAULT_SECTION);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::RuntimeSocketMount { .. })
        ));
    }

    #[test]
    fn test_socket_binds_listed_when_allowed() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("engine.toml");

        let toml_content = r#"
[default.runtime]
allow_socket_mount = true

[default.runtime.workers.network_capture]
container = "autoencoders"
image = "thoth/ae:latest"
binds = ["/var/run:/var/run", "/srv/models:/models:ro"]
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path, DEFAULT_SECTION).unwrap();
        assert_eq!(
            config.socket_binds(),
            vec![("autoencoders", "/var/run:/var/run")]
        );
    }
}
