//! Object storage for ingested files
//! Uses Apache Arrow object_store crate, one store per bucket

mod provision;

pub use provision::connect;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload,
    path::Path as StoragePath,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload of '{key}' to bucket '{bucket}' failed: {source}")]
    UploadFailed {
        bucket: String,
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("Failed to read local file {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored '{key}' but could not remove local file {}: {source}", path.display())]
    Cleanup {
        key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Bucket '{bucket}' setup failed: {reason}")]
    BucketSetup { bucket: String, reason: String },

    #[error("Unknown bucket: {0}")]
    UnknownBucket(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata returned after upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub size: usize,
}

/// Client for a single bucket
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
    attributes: Attributes,
}

impl StorageClient {
    /// Wrap any object_store backend. `content_type` is attached to every
    /// upload; pass `None` for backends that reject object attributes.
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, content_type: Option<&str>) -> Self {
        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.to_string()),
            );
        }

        Self {
            store,
            bucket: bucket.into(),
            attributes,
        }
    }

    /// In-memory bucket for testing/development
    pub fn in_memory(bucket: impl Into<String>, content_type: &str) -> Self {
        Self::new(
            Arc::new(object_store::memory::InMemory::new()),
            bucket,
            Some(content_type),
        )
    }

    /// Upload bytes under `key`, overwriting any existing object
    pub async fn upload(&self, key: &str, data: Bytes) -> Result<UploadMetadata> {
        let path = StoragePath::from(key);
        let size = data.len();

        let opts = PutOptions {
            attributes: self.attributes.clone(),
            ..Default::default()
        };

        let put_result = self
            .store
            .put_opts(&path, PutPayload::from(data), opts)
            .await
            .map_err(|source| StorageError::UploadFailed {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source,
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key,
            size,
            etag = put_result.e_tag.as_deref().unwrap_or("-"),
            "Uploaded to storage"
        );

        Ok(UploadMetadata {
            key: key.to_string(),
            size,
        })
    }

    /// Download from storage
    pub async fn download(&self, key: &str) -> Result<Bytes> {
        let path = StoragePath::from(key);

        let bytes = self.store.get(&path).await?.bytes().await?;

        tracing::debug!(bucket = %self.bucket, key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes)
    }

    /// All keys under an optional prefix, sorted
    pub async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let prefix = prefix.map(StoragePath::from);

        let mut keys: Vec<String> = self
            .store
            .list(prefix.as_ref())
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        keys.sort();

        Ok(keys)
    }
}

/// The set of buckets known to the process, keyed by name
#[derive(Clone, Default)]
pub struct Buckets {
    clients: BTreeMap<String, StorageClient>,
}

impl Buckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, client: StorageClient) {
        self.clients.insert(client.bucket.clone(), client);
    }

    /// In-memory buckets for testing/development
    pub fn in_memory<'a>(names: impl IntoIterator<Item = &'a str>, content_type: &str) -> Self {
        let mut buckets = Self::new();
        for name in names {
            buckets.insert(StorageClient::in_memory(name, content_type));
        }
        buckets
    }

    pub fn get(&self, bucket: &str) -> Result<&StorageClient> {
        self.clients
            .get(bucket)
            .ok_or_else(|| StorageError::UnknownBucket(bucket.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}
