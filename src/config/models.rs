use crate::classify::Category;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration (one section of the config file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Upper bound on the ingest request body
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_max_payload_bytes() -> usize {
    64 * 1024
}

/// Remote fetch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Prefix for ingest requests that carry a relative path instead of a URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Where fetched files are written before upload
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl FetchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            download_dir: default_download_dir(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8880".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("data/incoming")
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    concat!("thoth-engine/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// S3-compatible endpoint (MinIO in the reference deployment)
    S3,
    /// Directory per bucket under `local_root`
    Local,
    #[default]
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
    #[serde(default = "default_input_bucket")]
    pub input_bucket: String,
    #[serde(default = "default_output_bucket")]
    pub output_bucket: String,
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

impl StorageConfig {
    pub fn buckets(&self) -> [&str; 2] {
        [&self.input_bucket, &self.output_bucket]
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            endpoint: None,
            region: None,
            access_key: None,
            secret_key: None,
            input_bucket: default_input_bucket(),
            output_bucket: default_output_bucket(),
            local_root: default_local_root(),
            content_type: default_content_type(),
        }
    }
}

fn default_input_bucket() -> String {
    "input".to_string()
}

fn default_output_bucket() -> String {
    "output".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from("data/buckets")
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

/// Container runtime backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeProvider {
    #[default]
    Docker,
    /// Simulated containers, for development without a daemon
    Memory,
}

/// Container runtime configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub provider: RuntimeProvider,
    /// Docker Engine unix socket
    #[serde(default = "default_socket")]
    pub socket: String,
    /// Bound on status lookups and resumes
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// Bound on create + start, which may include an image pull
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
    /// Permit worker binds that expose the host runtime socket
    #[serde(default)]
    pub allow_socket_mount: bool,
    #[serde(default)]
    pub workers: WorkersConfig,
}

impl RuntimeConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: RuntimeProvider::default(),
            socket: default_socket(),
            query_timeout_secs: default_query_timeout_secs(),
            start_timeout_secs: default_start_timeout_secs(),
            allow_socket_mount: false,
            workers: WorkersConfig::default(),
        }
    }
}

fn default_socket() -> String {
    "/var/run/docker.sock".to_string()
}

fn default_query_timeout_secs() -> u64 {
    10
}

fn default_start_timeout_secs() -> u64 {
    120
}

/// Worker container per category
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkersConfig {
    #[serde(default = "default_network_capture_worker")]
    pub network_capture: WorkerConfig,
    #[serde(default = "default_text_log_worker")]
    pub text_log: WorkerConfig,
    #[serde(default = "default_tabular_worker")]
    pub tabular: WorkerConfig,
}

impl WorkersConfig {
    pub fn get(&self, category: Category) -> Option<&WorkerConfig> {
        match category {
            Category::NetworkCapture => Some(&self.network_capture),
            Category::TextLog => Some(&self.text_log),
            Category::Tabular => Some(&self.tabular),
            Category::Unclassified => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &WorkerConfig)> {
        Category::WITH_WORKERS
            .into_iter()
            .filter_map(|category| self.get(category).map(|worker| (category, worker)))
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            network_capture: default_network_capture_worker(),
            text_log: default_text_log_worker(),
            tabular: default_tabular_worker(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkerConfig {
    pub container: String,
    pub image: String,
    /// Docker-style `host:container[:mode]` binds
    #[serde(default)]
    pub binds: Vec<String>,
}

fn worker(container: &str, image: &str) -> WorkerConfig {
    WorkerConfig {
        container: container.to_string(),
        image: image.to_string(),
        binds: Vec::new(),
    }
}

fn default_network_capture_worker() -> WorkerConfig {
    worker("autoencoders", "thoth/ae:latest")
}

fn default_text_log_worker() -> WorkerConfig {
    worker("nlp", "thoth/nlp:latest")
}

fn default_tabular_worker() -> WorkerConfig {
    worker("classic", "thoth/classic:latest")
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// File receiving a copy of all log output; `None` logs to stdout only
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Size at which the log file is rotated; 0 disables rotation
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Rotated files kept as `<log_file>.1` .. `<log_file>.N`
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            level: default_log_level(),
            max_file_bytes: default_max_file_bytes(),
            backup_count: default_backup_count(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    1_000_000
}

fn default_backup_count() -> usize {
    10
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("engine.log"))
}

fn default_log_level() -> String {
    "info".to_string()
}
