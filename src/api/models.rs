//! Request and response bodies of the HTTP API
//!
//! ```json
//! POST /ingest
//! {"file_path": "/download?file=capture.pcap"}
//!
//! 200 OK
//! {"path": "network-capture/capture.pcap", "bucket": "input", "category": "network-capture"}
//! ```

use serde::{Deserialize, Serialize};

use crate::classify::Category;
use crate::dispatch::StoredObject;

#[derive(Debug, Deserialize, Clone)]
pub struct IngestRequest {
    /// Absolute URL, or a path on the configured base URL
    #[serde(alias = "url")]
    pub file_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IngestResponse {
    /// `<category>/<filename>`
    pub path: String,
    pub bucket: String,
    pub category: Category,
}

impl From<StoredObject> for IngestResponse {
    fn from(stored: StoredObject) -> Self {
        Self {
            path: stored.key(),
            bucket: stored.bucket,
            category: stored.category,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
