use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{error, info, warn};

use super::{
    services::{health, ingest, metrics},
    state::AppState,
};
use crate::config::{Config, RuntimeProvider};
use crate::dispatch::{Dispatcher, WorkerRegistry};
use crate::fetch::Fetcher;
use crate::ingest::IngestService;
use crate::runtime::{ContainerRuntime, DockerRuntime, InMemoryRuntime, UnavailableRuntime};
use crate::storage;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/operators/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(state)
        // Transparently handles Content-Encoding on request bodies
        .layer(RequestDecompressionLayer::new())
}

/// Construct every client from configuration and wire the ingest service
pub async fn build_state(config: Config) -> Result<AppState, AnyError> {
    info!(provider = ?config.storage.provider, "Provisioning buckets");
    let buckets = storage::connect(&config.storage)
        .await
        .map_err(|e| format!("Failed to provision storage: {e}"))?;

    for (container, bind) in config.socket_binds() {
        warn!(container, bind, "Worker bind exposes the host container runtime socket");
    }

    let runtime = connect_runtime(&config);

    let dispatcher = Dispatcher::builder()
        .runtime(runtime)
        .buckets(buckets)
        .workers(WorkerRegistry::from_config(&config.runtime.workers))
        .query_timeout(config.runtime.query_timeout())
        .start_timeout(config.runtime.start_timeout())
        .build();

    let fetcher = Fetcher::new(&config.fetch).map_err(|e| format!("Failed to build HTTP client: {e}"))?;

    tokio::fs::create_dir_all(&config.fetch.download_dir).await?;

    let service = IngestService::builder()
        .fetcher(fetcher)
        .dispatcher(Arc::new(dispatcher))
        .download_dir(config.fetch.download_dir.clone())
        .input_bucket(config.storage.input_bucket.clone())
        .build();

    Ok(AppState::new(config, service))
}

/// A runtime that cannot be reached does not stop the server; ingests still
/// store files and the worker failures are logged.
fn connect_runtime(config: &Config) -> Arc<dyn ContainerRuntime> {
    match config.runtime.provider {
        RuntimeProvider::Memory => {
            info!("Using in-memory container runtime");
            Arc::new(InMemoryRuntime::new())
        }
        RuntimeProvider::Docker => {
            match DockerRuntime::connect(&config.runtime.socket, config.runtime.query_timeout()) {
                Ok(docker) => {
                    info!(socket = %config.runtime.socket, "Connected to Docker");
                    Arc::new(docker)
                }
                Err(e) => {
                    warn!(socket = %config.runtime.socket, error = %e, "Docker unavailable, workers will not be started");
                    Arc::new(UnavailableRuntime::new(e.to_string()))
                }
            }
        }
    }
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);
    let state = build_state(config).await?;
    let app = build_router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Ingest API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
