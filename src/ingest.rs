//! Ingestion flow: fetch, classify, ensure worker, store

use bon::Builder;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::classify::{Category, classify};
use crate::dispatch::{Dispatcher, StoredObject, WorkerOutcome};
use crate::fetch::{FetchError, Fetcher, file_name_for};
use crate::observability::Metrics;
use crate::storage::StorageError;

/// Failures of the required steps. Worker problems never show up here.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Local I/O on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Builder)]
pub struct IngestService {
    fetcher: Fetcher,
    dispatcher: Arc<Dispatcher>,
    /// Fetched files wait here until uploaded
    #[builder(into)]
    download_dir: PathBuf,
    #[builder(into)]
    input_bucket: String,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl IngestService {
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Fetch `reference` (URL or path on the base URL) and store it in the
    /// input bucket under its category.
    pub async fn handle_ingest(&self, reference: &str) -> Result<StoredObject, IngestError> {
        let ingest_id = Uuid::now_v7();
        let span = info_span!("ingest", %ingest_id, reference);

        let result = self.run(ingest_id, reference).instrument(span.clone()).await;

        let _entered = span.enter();
        match &result {
            Ok(stored) => {
                self.metrics.ingest_accepted();
                info!(object = %stored, "Ingest completed");
            }
            Err(err) => {
                self.metrics.ingest_failed();
                error!(error = %err, "Ingest failed");
            }
        }

        result
    }

    async fn run(&self, ingest_id: Uuid, reference: &str) -> Result<StoredObject, IngestError> {
        let url = self.fetcher.resolve(reference)?;
        let filename = file_name_for(&url)?;

        let bytes = self.fetcher.fetch(&url).await?;

        // One staging directory per ingest, so concurrent fetches of the same
        // name never share a local file
        let staging_dir = self.download_dir.join(ingest_id.simple().to_string());
        let local_path = staging_dir.join(&filename);
        tokio::fs::create_dir_all(&staging_dir)
            .await
            .map_err(|source| IngestError::LocalIo {
                path: staging_dir.clone(),
                source,
            })?;
        tokio::fs::write(&local_path, &bytes)
            .await
            .map_err(|source| IngestError::LocalIo {
                path: local_path.clone(),
                source,
            })?;
        info!(file = %local_path.display(), size = bytes.len(), "Fetched");

        let category = classify(&filename);
        info!(%category, filename = %filename, "Classified");

        self.ensure_worker(category).await;

        let stored = self
            .dispatcher
            .store(category, &local_path, &self.input_bucket)
            .await?;

        if let Err(e) = tokio::fs::remove_dir(&staging_dir).await {
            warn!(dir = %staging_dir.display(), error = %e, "Failed to remove staging directory");
        }

        Ok(stored)
    }

    /// Best effort: outcome is logged and counted, never returned
    async fn ensure_worker(&self, category: Category) {
        match self.dispatcher.ensure_worker_running(category).await {
            Ok(WorkerOutcome::NoWorker) => {}
            Ok(outcome) => {
                if outcome.started() {
                    self.metrics.worker_started();
                }
            }
            Err(err) => {
                self.metrics.worker_error();
                warn!(%category, error = %err, "Worker unavailable, continuing ingest");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetchConfig, WorkersConfig};
    use crate::dispatch::WorkerRegistry;
    use crate::runtime::{ContainerRuntime, InMemoryRuntime, UnavailableRuntime, WorkerStatus};
    use crate::storage::Buckets;
    use axum::{Router, http::StatusCode, routing::get};
    use tempfile::TempDir;

    async fn start_file_server() -> String {
        let app = Router::new()
            .route("/files/boot.log", get(|| async { "kernel: boot ok\n" }))
            .route("/files/flows.csv", get(|| async { "src,dst\n10.0.0.1,10.0.0.2\n" }))
            .route("/files/notes.txt", get(|| async { "plain text" }))
            .route("/download", get(|| async { "pcap-bytes" }))
            .route(
                "/files/slow.log",
                get(|| async {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    "slow line\n"
                }),
            )
            .route(
                "/files/gone.pcap",
                get(|| async { (StatusCode::NOT_FOUND, "gone") }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }

    fn service(base_url: &str, download_dir: &std::path::Path, runtime: Arc<dyn ContainerRuntime>) -> IngestService {
        let fetch = FetchConfig {
            base_url: base_url.to_string(),
            ..FetchConfig::default()
        };
        let dispatcher = Dispatcher::builder()
            .runtime(runtime)
            .buckets(Buckets::in_memory(["input", "output"], "application/octet-stream"))
            .workers(WorkerRegistry::from_config(&WorkersConfig::default()))
            .build();

        IngestService::builder()
            .fetcher(Fetcher::new(&fetch).unwrap())
            .dispatcher(Arc::new(dispatcher))
            .download_dir(download_dir)
            .input_bucket("input")
            .build()
    }

    #[tokio::test]
    async fn test_ingest_log_starts_worker_and_stores() {
        let base = start_file_server().await;
        let temp_dir = TempDir::new().unwrap();
        let runtime = Arc::new(InMemoryRuntime::new());
        let service = service(&base, temp_dir.path(), runtime.clone());

        let stored = service.handle_ingest("/files/boot.log").await.unwrap();

        assert_eq!(stored.key(), "text-log/boot.log");
        assert_eq!(stored.category, Category::TextLog);
        assert_eq!(runtime.current("nlp"), WorkerStatus::Running);
        assert!(std::fs::read_dir(temp_dir.path()).unwrap().next().is_none());

        let bucket = service.dispatcher().buckets().get("input").unwrap();
        assert_eq!(&bucket.download("text-log/boot.log").await.unwrap()[..], b"kernel: boot ok\n");

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.ingests_accepted, 1);
        assert_eq!(snapshot.workers_started, 1);
    }

    #[tokio::test]
    async fn test_ingest_name_from_query() {
        let base = start_file_server().await;
        let temp_dir = TempDir::new().unwrap();
        let service = service(&base, temp_dir.path(), Arc::new(InMemoryRuntime::new()));

        let stored = service.handle_ingest("/download?file=capture.pcap").await.unwrap();

        assert_eq!(stored.key(), "network-capture/capture.pcap");
    }

    #[tokio::test]
    async fn test_ingest_unclassified_skips_runtime() {
        let base = start_file_server().await;
        let temp_dir = TempDir::new().unwrap();
        let runtime = Arc::new(InMemoryRuntime::new());
        let service = service(&base, temp_dir.path(), runtime.clone());

        let stored = service.handle_ingest("/files/notes.txt").await.unwrap();

        assert_eq!(stored.key(), "unclassified/notes.txt");
        assert_eq!(runtime.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_ingest_survives_runtime_failure() {
        let base = start_file_server().await;
        let temp_dir = TempDir::new().unwrap();
        let service = service(
            &base,
            temp_dir.path(),
            Arc::new(UnavailableRuntime::new("no socket")),
        );

        let stored = service.handle_ingest("/files/flows.csv").await.unwrap();

        assert_eq!(stored.key(), "tabular/flows.csv");
        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.ingests_accepted, 1);
        assert_eq!(snapshot.worker_errors, 1);
    }

    #[tokio::test]
    async fn test_ingest_fetch_failure_stores_nothing() {
        let base = start_file_server().await;
        let temp_dir = TempDir::new().unwrap();
        let runtime = Arc::new(InMemoryRuntime::new());
        let service = service(&base, temp_dir.path(), runtime.clone());

        let err = service.handle_ingest("/files/gone.pcap").await.unwrap_err();

        assert!(matches!(err, IngestError::Fetch(FetchError::Status { status: 404, .. })));
        assert_eq!(runtime.status_calls(), 0);
        let bucket = service.dispatcher().buckets().get("input").unwrap();
        assert!(bucket.list_keys(None).await.unwrap().is_empty());
        assert_eq!(service.metrics().snapshot().ingests_failed, 1);
    }

    #[tokio::test]
    async fn test_overlapping_ingests_of_same_file_both_succeed() {
        let base = start_file_server().await;
        let temp_dir = TempDir::new().unwrap();
        let service = Arc::new(service(&base, temp_dir.path(), Arc::new(InMemoryRuntime::new())));

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.handle_ingest("/files/slow.log").await }
        });
        let second = tokio::spawn({
            let service = service.clone();
            async move { service.handle_ingest("/files/slow.log").await }
        });

        assert_eq!(first.await.unwrap().unwrap().key(), "text-log/slow.log");
        assert_eq!(second.await.unwrap().unwrap().key(), "text-log/slow.log");

        let bucket = service.dispatcher().buckets().get("input").unwrap();
        assert_eq!(bucket.list_keys(None).await.unwrap(), vec!["text-log/slow.log"]);
        assert_eq!(service.metrics().snapshot().ingests_accepted, 2);
        assert!(std::fs::read_dir(temp_dir.path()).unwrap().next().is_none());
    }
}
