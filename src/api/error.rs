use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use super::models::ErrorResponse;
use crate::fetch::FetchError;
use crate::ingest::IngestError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("fetch timed out: {0}")]
    FetchTimeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::FetchFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::FetchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::FetchFailed(_) => "FETCH_FAILED",
            ApiError::FetchTimeout(_) => "FETCH_TIMEOUT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(json!(body))).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Fetch(FetchError::InvalidUrl(reason)) => ApiError::InvalidPayload(reason),
            IngestError::Fetch(err @ FetchError::Timeout(_)) => ApiError::FetchTimeout(err.to_string()),
            IngestError::Fetch(err) => ApiError::FetchFailed(err.to_string()),
            err @ (IngestError::LocalIo { .. } | IngestError::Storage(_)) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;

    #[test]
    fn test_ingest_errors_map_to_status() {
        let cases = [
            (
                IngestError::Fetch(FetchError::InvalidUrl("ftp://x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                IngestError::Fetch(FetchError::Status { url: "http://h/a.log".into(), status: 404 }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                IngestError::Fetch(FetchError::Timeout("http://h/a.log".into())),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                IngestError::Storage(StorageError::UnknownBucket("input".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }
}
