use super::models::{Config, StorageProvider};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid bucket name '{bucket}': {reason}")]
    InvalidBucketName { bucket: String, reason: &'static str },

    #[error("Input and output buckets must differ (both are '{0}')")]
    SameBuckets(String),

    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("Invalid fetch base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Timeout must be positive: {field}")]
    InvalidTimeout { field: &'static str },

    #[error("Worker for '{category}' has an empty {field}")]
    EmptyWorkerField { category: String, field: &'static str },

    #[error("Container name '{0}' is used by more than one worker")]
    DuplicateContainerName(String),

    #[error(
        "Worker '{container}' bind '{bind}' exposes the host container runtime socket; \
         set runtime.allow_socket_mount = true to permit it"
    )]
    RuntimeSocketMount { container: String, bind: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_storage(config)?;
    validate_fetch(config)?;
    validate_runtime(config)?;
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    let storage = &config.storage;

    for bucket in storage.buckets() {
        validate_bucket_name(bucket)?;
    }

    if storage.input_bucket == storage.output_bucket {
        return Err(ValidationError::SameBuckets(storage.input_bucket.clone()));
    }

    if storage.provider == StorageProvider::S3
        && (storage.access_key.is_none() || storage.secret_key.is_none())
    {
        return Err(ValidationError::MissingS3Credentials);
    }

    Ok(())
}

/// S3 naming rules, minus the IP-address form
fn validate_bucket_name(bucket: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidBucketName {
        bucket: bucket.to_string(),
        reason,
    };

    if !(3..=63).contains(&bucket.len()) {
        return Err(invalid("length must be between 3 and 63"));
    }

    if !bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid("only lowercase letters, digits, '-' and '.' are allowed"));
    }

    let edges_ok = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !bucket.starts_with(edges_ok) || !bucket.ends_with(edges_ok) {
        return Err(invalid("must start and end with a letter or digit"));
    }

    Ok(())
}

fn validate_fetch(config: &Config) -> Result<(), ValidationError> {
    let fetch = &config.fetch;

    let url = reqwest::Url::parse(&fetch.base_url).map_err(|e| ValidationError::InvalidBaseUrl {
        url: fetch.base_url.clone(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidBaseUrl {
            url: fetch.base_url.clone(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if fetch.connect_timeout_secs == 0 {
        return Err(ValidationError::InvalidTimeout {
            field: "fetch.connect_timeout_secs",
        });
    }
    if fetch.request_timeout_secs == 0 {
        return Err(ValidationError::InvalidTimeout {
            field: "fetch.request_timeout_secs",
        });
    }

    Ok(())
}

fn validate_runtime(config: &Config) -> Result<(), ValidationError> {
    let runtime = &config.runtime;

    if runtime.query_timeout_secs == 0 {
        return Err(ValidationError::InvalidTimeout {
            field: "runtime.query_timeout_secs",
        });
    }
    if runtime.start_timeout_secs == 0 {
        return Err(ValidationError::InvalidTimeout {
            field: "runtime.start_timeout_secs",
        });
    }

    let mut seen = HashSet::new();
    for (category, worker) in runtime.workers.iter() {
        if worker.container.trim().is_empty() {
            return Err(ValidationError::EmptyWorkerField {
                category: category.to_string(),
                field: "container",
            });
        }
        if worker.image.trim().is_empty() {
            return Err(ValidationError::EmptyWorkerField {
                category: category.to_string(),
                field: "image",
            });
        }
        if !seen.insert(worker.container.as_str()) {
            return Err(ValidationError::DuplicateContainerName(
                worker.container.clone(),
            ));
        }

        if runtime.allow_socket_mount {
            continue;
        }
        if let Some(bind) = worker
            .binds
            .iter()
            .find(|bind| exposes_socket(bind, &runtime.socket))
        {
            return Err(ValidationError::RuntimeSocketMount {
                container: worker.container.clone(),
                bind: bind.clone(),
            });
        }
    }

    Ok(())
}

/// Socket files of the common container runtimes
const RUNTIME_SOCKET_NAMES: [&str; 3] = ["docker.sock", "containerd.sock", "podman.sock"];

/// Runtime state directories that hold sockets besides the configured one
const RUNTIME_DIRS: [&str; 3] = ["/run/docker", "/run/containerd", "/run/podman"];

/// True when the host side of a bind reaches a container runtime socket:
/// the configured socket, a runtime state directory, anything below them, or
/// one of their parents. Symlinks are resolved where the path exists and
/// `/run` and `/var/run` are treated as the same directory.
pub(crate) fn exposes_socket(bind: &str, socket: &str) -> bool {
    let host = bind.split(':').next().unwrap_or_default();
    if host.is_empty() {
        return false;
    }

    let protected: Vec<PathBuf> = std::iter::once(socket)
        .chain(RUNTIME_DIRS)
        .flat_map(|path| path_aliases(Path::new(path)))
        .collect();

    path_aliases(Path::new(host)).iter().any(|host| {
        let is_socket_file = host
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| RUNTIME_SOCKET_NAMES.contains(&name));

        is_socket_file
            || protected
                .iter()
                .any(|target| target.starts_with(host) || host.starts_with(target))
    })
}

/// The path as written, its canonical form if it exists, and the
/// `/run` <-> `/var/run` spelling of each
fn path_aliases(path: &Path) -> Vec<PathBuf> {
    let mut aliases = vec![path.to_path_buf()];
    if let Ok(canonical) = std::fs::canonicalize(path) {
        aliases.push(canonical);
    }

    let swapped: Vec<PathBuf> = aliases
        .iter()
        .filter_map(|alias| {
            [("/var/run", "/run"), ("/run", "/var/run")]
                .into_iter()
                .find_map(|(from, to)| alias.strip_prefix(from).ok().map(|rest| Path::new(to).join(rest)))
        })
        .collect();
    aliases.extend(swapped);

    aliases
}
