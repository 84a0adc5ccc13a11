use super::models::Config;
use config::{ConfigError, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "ENGINE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/engine.toml";
pub const DEFAULT_SECTION: &str = "default";
const ENV_PREFIX: &str = "ENGINE";
const ENV_SEPARATOR: &str = "__";

/// Resolve the config file path: explicit argument, then `ENGINE_CONFIG`,
/// then the default location.
pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Full load used by the binary: `.env`, the file section, environment
/// overrides, then secrets.
pub fn load(config_path: PathBuf, section: &str) -> Result<Config, ConfigError> {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        tracing::warn!(error = %e, "Ignoring unreadable .env file");
    }

    let mut config = load_from_sources(config_path, section)?;
    apply_secrets(&mut config, |name| env::var(name).ok());

    Ok(config)
}

/// Credentials come from the environment only; the engine-specific names win
/// over the AWS ones.
fn apply_secrets(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let first = |names: [&str; 2]| names.into_iter().find_map(&lookup);

    if let Some(access_key) = first(["S3_ACCESS_KEY", "AWS_ACCESS_KEY_ID"]) {
        config.storage.access_key = Some(access_key);
    }
    if let Some(secret_key) = first(["S3_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"]) {
        config.storage.secret_key = Some(secret_key);
    }
}

/// Load one section of a config file plus environment overrides.
///
/// The file holds one top-level table per section (`[default]`,
/// `[production]`, ...). A missing file falls back to defaults; a missing
/// section in an existing file is an error.
pub fn load_from_sources(config_path: PathBuf, section: &str) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(
            path = %config_path.display(),
            section,
            "Loading configuration"
        );
        let section_toml = read_section(&config_path, section)?;
        builder = builder.add_source(File::from_str(&section_toml, FileFormat::Toml));
    } else {
        tracing::warn!(
            path = %config_path.display(),
            "No configuration file, running on defaults and environment"
        );
    }

    // ENGINE__SERVER__BIND_ADDR -> server.bind_addr
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

/// Extract a single section table and re-serialize it as standalone TOML
fn read_section(path: &Path, section: &str) -> Result<String, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Foreign(Box::new(e)))?;
    let mut document: toml::Table =
        toml::from_str(&raw).map_err(|e| ConfigError::Foreign(Box::new(e)))?;

    let table = match document.remove(section) {
        Some(toml::Value::Table(table)) => table,
        Some(_) => {
            return Err(ConfigError::Message(format!(
                "section '{section}' in {} is not a table",
                path.display()
            )));
        }
        None => return Err(ConfigError::NotFound(format!("section '{section}'"))),
    };

    toml::to_string(&table).map_err(|e| ConfigError::Foreign(Box::new(e)))
}
