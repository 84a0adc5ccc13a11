//! Bucket provisioning at startup
//!
//! object_store has no notion of creating buckets, so S3 buckets are created
//! through the AWS SDK before the per-bucket stores are built.

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use std::sync::Arc;
use tracing::info;

use super::{Buckets, Result, StorageClient, StorageError};
use crate::config::{StorageConfig, StorageProvider};

const DEFAULT_REGION: &str = "us-east-1";

/// Create the configured buckets if absent and return a client for each
pub async fn connect(config: &StorageConfig) -> Result<Buckets> {
    let mut buckets = Buckets::new();

    match config.provider {
        StorageProvider::Memory => {
            for name in config.buckets() {
                info!(bucket = name, "Using in-memory bucket");
                buckets.insert(StorageClient::in_memory(name, &config.content_type));
            }
        }
        StorageProvider::Local => {
            for name in config.buckets() {
                let root = config.local_root.join(name);
                tokio::fs::create_dir_all(&root)
                    .await
                    .map_err(|e| setup_error(name, e))?;
                let store = LocalFileSystem::new_with_prefix(&root).map_err(|e| setup_error(name, e))?;
                info!(bucket = name, root = %root.display(), "Using local bucket");
                // LocalFileSystem rejects object attributes
                buckets.insert(StorageClient::new(Arc::new(store), name, None));
            }
        }
        StorageProvider::S3 => {
            let sdk = sdk_client(config)?;
            for name in config.buckets() {
                ensure_s3_bucket(&sdk, config, name).await?;
                let store = s3_store(config, name)?;
                buckets.insert(StorageClient::new(
                    Arc::new(store),
                    name,
                    Some(&config.content_type),
                ));
            }
        }
    }

    Ok(buckets)
}

fn setup_error(bucket: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::BucketSetup {
        bucket: bucket.to_string(),
        reason: err.to_string(),
    }
}

fn credentials(config: &StorageConfig) -> Result<(&str, &str)> {
    match (config.access_key.as_deref(), config.secret_key.as_deref()) {
        (Some(access), Some(secret)) => Ok((access, secret)),
        _ => Err(StorageError::BucketSetup {
            bucket: config.input_bucket.clone(),
            reason: "missing S3 credentials".to_string(),
        }),
    }
}

fn region(config: &StorageConfig) -> &str {
    config.region.as_deref().unwrap_or(DEFAULT_REGION)
}

fn sdk_client(config: &StorageConfig) -> Result<aws_sdk_s3::Client> {
    let (access, secret) = credentials(config)?;

    let mut builder = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(region(config).to_string()))
        .credentials_provider(Credentials::new(access, secret, None, None, "thoth-engine"))
        // MinIO and most S3-compatible servers only do path-style addressing
        .force_path_style(true);

    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint_url(endpoint);
    }

    Ok(aws_sdk_s3::Client::from_conf(builder.build()))
}

/// Idempotent bucket creation
async fn ensure_s3_bucket(
    client: &aws_sdk_s3::Client,
    config: &StorageConfig,
    bucket: &str,
) -> Result<()> {
    match client.head_bucket().bucket(bucket).send().await {
        Ok(_) => {
            info!(bucket, "Bucket already exists");
            return Ok(());
        }
        Err(err) => {
            let service_err = err.into_service_error();
            if !service_err.is_not_found() {
                return Err(setup_error(bucket, service_err));
            }
        }
    }

    let mut request = client.create_bucket().bucket(bucket);
    let region = region(config);
    if region != DEFAULT_REGION {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build(),
        );
    }

    match request.send().await {
        Ok(_) => {
            info!(bucket, "Created bucket");
            Ok(())
        }
        Err(err) => {
            let service_err = err.into_service_error();
            // Lost a race with another instance
            if service_err.is_bucket_already_owned_by_you() {
                info!(bucket, "Bucket already exists");
                Ok(())
            } else {
                Err(setup_error(bucket, service_err))
            }
        }
    }
}

fn s3_store(config: &StorageConfig, bucket: &str) -> Result<object_store::aws::AmazonS3> {
    let (access, secret) = credentials(config)?;

    let mut builder = AmazonS3Builder::new()
        .with_region(region(config))
        .with_bucket_name(bucket)
        .with_access_key_id(access)
        .with_secret_access_key(secret);

    if let Some(endpoint) = &config.endpoint {
        let allow_http = endpoint.starts_with("http://");
        builder = builder
            .with_endpoint(endpoint.clone())
            .with_allow_http(allow_http)
            .with_virtual_hosted_style_request(false);
    }

    builder.build().map_err(|e| setup_error(bucket, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_memory() {
        let buckets = connect(&StorageConfig::default()).await.unwrap();
        assert_eq!(buckets.names().collect::<Vec<_>>(), vec!["input", "output"]);
    }

    #[tokio::test]
    async fn test_connect_local_creates_bucket_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            provider: StorageProvider::Local,
            local_root: temp_dir.path().to_path_buf(),
            ..StorageConfig::default()
        };

        let buckets = connect(&config).await.unwrap();
        assert!(temp_dir.path().join("input").is_dir());
        assert!(temp_dir.path().join("output").is_dir());

        buckets
            .get("input")
            .unwrap()
            .upload("tabular/t.csv", Bytes::from_static(b"a,b\n"))
            .await
            .unwrap();
        assert!(temp_dir.path().join("input/tabular/t.csv").is_file());

        // Second connect is a no-op on existing directories
        assert!(connect(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_s3_requires_credentials() {
        let config = StorageConfig {
            provider: StorageProvider::S3,
            endpoint: Some("http://localhost:9000".to_string()),
            ..StorageConfig::default()
        };

        assert!(matches!(
            connect(&config).await,
            Err(StorageError::BucketSetup { .. })
        ));
    }
}
