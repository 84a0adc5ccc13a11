//! Category dispatch: worker lifecycle plus the storage write
//!
//! The two halves have independent result types. Starting a worker is best
//! effort and its [`RuntimeError`] is for logging; storing the file is
//! required and its [`StorageError`] fails the ingest.

mod registry;

pub use registry::{HandleOrigin, WorkerHandle, WorkerRegistry};

use bon::Builder;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::classify::Category;
use crate::runtime::{ContainerRuntime, RuntimeError, WorkerStatus};
use crate::storage::{Buckets, StorageError};

/// Location of an ingested file in object storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub bucket: String,
    pub category: Category,
    pub filename: String,
}

impl StoredObject {
    /// Key inside the bucket, also the path reported back to clients
    pub fn key(&self) -> String {
        object_key(self.category, &self.filename)
    }
}

impl fmt::Display for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.bucket, self.category, self.filename)
    }
}

pub fn object_key(category: Category, filename: &str) -> String {
    format!("{}/{}", category.as_str(), filename)
}

/// Result of [`Dispatcher::ensure_worker_running`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    AlreadyRunning(WorkerHandle),
    Launched(WorkerHandle),
    Resumed(WorkerHandle),
    /// The category has no worker
    NoWorker,
}

impl WorkerOutcome {
    /// True when this call issued a start request
    pub fn started(&self) -> bool {
        matches!(self, WorkerOutcome::Launched(_) | WorkerOutcome::Resumed(_))
    }
}

#[derive(Builder)]
pub struct Dispatcher {
    runtime: Arc<dyn ContainerRuntime>,
    buckets: Buckets,
    workers: WorkerRegistry,
    /// Bound on status lookups and resumes
    #[builder(default = Duration::from_secs(10))]
    query_timeout: Duration,
    /// Bound on create + start
    #[builder(default = Duration::from_secs(120))]
    start_timeout: Duration,
}

impl Dispatcher {
    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    /// Make sure the category's worker container is running.
    ///
    /// Calls for the same category are serialised, so concurrent ingests of
    /// an absent worker produce a single start request. Does not wait for
    /// the worker to become ready.
    pub async fn ensure_worker_running(
        &self,
        category: Category,
    ) -> Result<WorkerOutcome, RuntimeError> {
        let Some(slot) = self.workers.slot(category) else {
            return Ok(WorkerOutcome::NoWorker);
        };

        let mut tracked = slot.handle.lock().await;
        let name = slot.spec.name.as_str();

        let status = bounded(self.query_timeout, self.runtime.status(name)).await?;
        debug!(%category, worker = name, ?status, "Worker status");

        match status {
            WorkerStatus::Running => {
                let handle = tracked
                    .get_or_insert_with(|| WorkerHandle::new(name, None, HandleOrigin::Discovered))
                    .clone();
                Ok(WorkerOutcome::AlreadyRunning(handle))
            }
            WorkerStatus::NotFound => {
                let id = bounded(self.start_timeout, self.runtime.launch(&slot.spec)).await?;
                info!(%category, worker = name, image = %slot.spec.image, container_id = %id, "Worker launched");

                let handle = WorkerHandle::new(name, Some(id), HandleOrigin::Launched);
                *tracked = Some(handle.clone());
                Ok(WorkerOutcome::Launched(handle))
            }
            WorkerStatus::Stopped(state) => {
                bounded(self.query_timeout, self.runtime.resume(name)).await?;
                info!(%category, worker = name, previous_state = %state, "Worker resumed");

                let container_id = tracked.as_ref().and_then(|h| h.container_id.clone());
                let handle = WorkerHandle::new(name, container_id, HandleOrigin::Resumed);
                *tracked = Some(handle.clone());
                Ok(WorkerOutcome::Resumed(handle))
            }
        }
    }

    /// Upload `local_path` to `bucket/<category>/<filename>` and remove the
    /// local file.
    ///
    /// On upload failure the local file is left in place. If the upload
    /// succeeds but removal fails, the object exists and
    /// [`StorageError::Cleanup`] is returned.
    pub async fn store(
        &self,
        category: Category,
        local_path: &Path,
        bucket: &str,
    ) -> Result<StoredObject, StorageError> {
        let client = self.buckets.get(bucket)?;

        let filename = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StorageError::ReadFailed {
                path: local_path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path has no UTF-8 file name",
                ),
            })?
            .to_string();

        let data = tokio::fs::read(local_path)
            .await
            .map_err(|source| StorageError::ReadFailed {
                path: local_path.to_path_buf(),
                source,
            })?;

        let key = object_key(category, &filename);
        let uploaded = client.upload(&key, Bytes::from(data)).await?;
        debug!(bucket, key = %uploaded.key, size = uploaded.size, "Removing local copy");

        tokio::fs::remove_file(local_path)
            .await
            .map_err(|source| StorageError::Cleanup {
                key: key.clone(),
                path: local_path.to_path_buf(),
                source,
            })?;

        Ok(StoredObject {
            bucket: bucket.to_string(),
            category,
            filename,
        })
    }
}

async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, RuntimeError>>,
) -> Result<T, RuntimeError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| RuntimeError::Timeout(limit))?
}
