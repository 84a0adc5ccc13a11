use axum::{Json, extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use super::{
    error::ApiError,
    models::{HealthResponse, IngestRequest, IngestResponse},
    state::AppState,
    utils,
    validation::validate_request,
};

/// Ingestion endpoint (POST /ingest)
///
/// Fetches the referenced file, makes sure its category's worker is running
/// and stores it in the input bucket. Responds once the object is written.
///
/// ## Flow:
/// 1. Validate Content-Type (application/json)
/// 2. Read body (gzip handled by middleware) up to the size limit
/// 3. Deserialize and validate the request
/// 4. Run the ingest and map its error onto a status code
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    utils::require_json(content_type)?;

    let body_bytes = read_body(body, state.config.server.max_payload_bytes).await?;

    let request: IngestRequest = serde_json::from_slice(&body_bytes)?;
    validate_request(&request).map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

    let stored = state.ingest.handle_ingest(&request.file_path).await?;

    Ok((StatusCode::OK, Json(IngestResponse::from(stored))))
}

/// Reads the request body, refusing to buffer more than `max_size` bytes.
///
/// The limit applies after decompression, so a small compressed body cannot
/// expand past it.
async fn read_body(body: axum::body::Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let collected = Limited::new(body, max_size).collect().await.map_err(|err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            ApiError::PayloadTooLarge(max_size)
        } else {
            ApiError::Internal(err.to_string())
        }
    })?;

    Ok(collected.to_bytes().to_vec())
}

/// Health check endpoint (GET /health)
pub async fn health() -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

/// Counter snapshot (GET /operators/metrics)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.ingest.metrics().snapshot())
}
