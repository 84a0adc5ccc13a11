//! Container runtime seam
//!
//! Worker containers are managed, not executed, by the engine: it only asks
//! the runtime whether a worker exists and starts it when it does not.

mod docker;
mod memory;

pub use docker::DockerRuntime;
pub use memory::InMemoryRuntime;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::WorkerConfig;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime did not answer within {0:?}")]
    Timeout(Duration),

    #[error("container runtime rejected request: {0}")]
    Api(String),

    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
}

/// Status of a named container as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    /// Exists but is not running; carries the runtime's state name
    Stopped(String),
    NotFound,
}

/// What to run for one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub name: String,
    pub image: String,
    pub binds: Vec<String>,
}

impl From<&WorkerConfig> for WorkerSpec {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            name: config.container.clone(),
            image: config.image.clone(),
            binds: config.binds.clone(),
        }
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Look up a container by name
    async fn status(&self, name: &str) -> Result<WorkerStatus, RuntimeError>;

    /// Create and start a detached container, returning its id.
    /// Returns once the runtime acknowledges the start, not when the worker
    /// is ready.
    async fn launch(&self, spec: &WorkerSpec) -> Result<String, RuntimeError>;

    /// Start an existing, stopped container
    async fn resume(&self, name: &str) -> Result<(), RuntimeError>;
}

/// Stand-in used when the runtime client could not be built at startup.
/// Every call fails, so ingestion carries on without workers.
#[derive(Debug, Clone)]
pub struct UnavailableRuntime {
    reason: String,
}

impl UnavailableRuntime {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> RuntimeError {
        RuntimeError::Unavailable(self.reason.clone())
    }
}

#[async_trait]
impl ContainerRuntime for UnavailableRuntime {
    async fn status(&self, _name: &str) -> Result<WorkerStatus, RuntimeError> {
        Err(self.error())
    }

    async fn launch(&self, _spec: &WorkerSpec) -> Result<String, RuntimeError> {
        Err(self.error())
    }

    async fn resume(&self, _name: &str) -> Result<(), RuntimeError> {
        Err(self.error())
    }
}
