//! HTTP client for fetching remote files

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use reqwest::{Client, Url};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::config::FetchConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Timed out fetching {0}")]
    Timeout(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether the caller may reasonably try the same request again
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Remote file downloader
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    base_url: String,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Turn an ingest reference into a URL.
    ///
    /// Absolute http(s) URLs are used as-is; anything else is treated as a
    /// path on the configured base URL.
    pub fn resolve(&self, reference: &str) -> Result<Url> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(FetchError::InvalidUrl("empty reference".to_string()));
        }

        let raw = if reference.contains("://") {
            reference.to_string()
        } else if reference.starts_with('/') {
            format!("{}{}", self.base_url, reference)
        } else {
            format!("{}/{}", self.base_url, reference)
        };

        let url = Url::parse(&raw).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        Ok(url)
    }

    /// Fetch the body of `url`. Non-2xx responses are errors; no retries.
    pub async fn fetch(&self, url: &Url) -> Result<Bytes> {
        debug!(%url, "Starting fetch");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        debug!(%url, size = bytes.len(), "Fetch completed");

        Ok(bytes)
    }
}

fn map_reqwest_error(url: &Url, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else {
        FetchError::RequestFailed(err.to_string())
    }
}

/// Local file name for a fetched URL.
///
/// The last path segment, percent-decoded, names the file. Download links
/// whose last segment carries no extension (`/download?file=capture.pcap`)
/// name the file in their last query value instead; other query strings,
/// such as presigned signatures, are ignored.
pub fn file_name_for(url: &Url) -> Result<String> {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .unwrap_or_default();

    let named_by_query = segment.is_empty() || Path::new(&segment).extension().is_none();
    let from_query = named_by_query
        .then(|| url.query_pairs().last().map(|(_, value)| value.into_owned()))
        .flatten()
        .filter(|value| !value.is_empty());

    let candidate = from_query.unwrap_or(segment);

    // Query values may carry a path of their own
    let name = candidate.rsplit('/').next().unwrap_or_default();

    if name.is_empty() || name == "." || name == ".." || name.contains(['\\', '\0']) {
        return Err(FetchError::InvalidUrl(format!(
            "cannot derive a file name from {url}"
        )));
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use std::time::Duration;

    fn fetcher(base_url: &str, request_timeout_secs: u64) -> Fetcher {
        let config = FetchConfig {
            base_url: base_url.to_string(),
            request_timeout_secs,
            ..FetchConfig::default()
        };
        Fetcher::new(&config).unwrap()
    }

    async fn start_mock_server() -> String {
        let app = Router::new()
            .route("/files/report.log", get(|| async { "line one\nline two\n" }))
            .route(
                "/files/missing.csv",
                get(|| async { (StatusCode::NOT_FOUND, "no such file") }),
            )
            .route(
                "/files/slow.pcap",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    "late"
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let fetcher = fetcher("http://collector.local:8880/", 60);

        let url = fetcher.resolve("/download?file=capture.pcap").unwrap();
        assert_eq!(url.as_str(), "http://collector.local:8880/download?file=capture.pcap");

        let url = fetcher.resolve("logs/report.log").unwrap();
        assert_eq!(url.as_str(), "http://collector.local:8880/logs/report.log");

        let url = fetcher.resolve("https://files.example.com/a/b.csv").unwrap();
        assert_eq!(url.as_str(), "https://files.example.com/a/b.csv");
    }

    #[test]
    fn test_resolve_rejects_bad_references() {
        let fetcher = fetcher("http://collector.local:8880", 60);

        assert!(matches!(fetcher.resolve("  "), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(
            fetcher.resolve("ftp://files.example.com/a.csv"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_file_name_from_path() {
        let url = Url::parse("http://h/files/report.log").unwrap();
        assert_eq!(file_name_for(&url).unwrap(), "report.log");
    }

    #[test]
    fn test_file_name_from_query() {
        let url = Url::parse("http://h/download?file=capture.pcap").unwrap();
        assert_eq!(file_name_for(&url).unwrap(), "capture.pcap");

        let url = Url::parse("http://h/download?id=7&path=nested%2Fdir%2Ftable.csv").unwrap();
        assert_eq!(file_name_for(&url).unwrap(), "table.csv");
    }

    #[test]
    fn test_file_name_ignores_unrelated_query() {
        let url = Url::parse("https://files.example.com/exports/report.log?version=2").unwrap();
        assert_eq!(file_name_for(&url).unwrap(), "report.log");

        let url = Url::parse(
            "https://bucket.s3.amazonaws.com/captures/capture.pcap?X-Amz-Expires=300&X-Amz-Signature=abc123",
        )
        .unwrap();
        assert_eq!(file_name_for(&url).unwrap(), "capture.pcap");
    }

    #[test]
    fn test_file_name_is_percent_decoded() {
        let url = Url::parse("http://h/files/my%20report.log").unwrap();
        assert_eq!(file_name_for(&url).unwrap(), "my report.log");

        // Encoded separators must not smuggle a path in
        let url = Url::parse("http://h/files/..%2F..%2Fetc%2Fpasswd.csv").unwrap();
        assert_eq!(file_name_for(&url).unwrap(), "passwd.csv");
    }

    #[test]
    fn test_file_name_rejects_empty_or_traversal() {
        for raw in ["http://h/", "http://h/files/", "http://h/dl?file=..", "http://h/dl?file=a%2F"] {
            let url = Url::parse(raw).unwrap();
            assert!(file_name_for(&url).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_only_timeouts_are_retryable() {
        assert!(FetchError::Timeout("u".into()).is_retryable());
        assert!(!FetchError::Status { url: "u".into(), status: 503 }.is_retryable());
        assert!(!FetchError::InvalidUrl("u".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let base = start_mock_server().await;
        let fetcher = fetcher(&base, 60);

        let url = fetcher.resolve("/files/report.log").unwrap();
        let bytes = fetcher.fetch(&url).await.unwrap();
        assert_eq!(&bytes[..], b"line one\nline two\n");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let base = start_mock_server().await;
        let fetcher = fetcher(&base, 60);

        let url = fetcher.resolve("/files/missing.csv").unwrap();
        match fetcher.fetch(&url).await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let base = start_mock_server().await;
        let fetcher = fetcher(&base, 1);

        let url = fetcher.resolve("/files/slow.pcap").unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
        assert!(err.is_retryable());
    }
}
