//! Resolution of job URIs to in-memory bytes.
//!
//! Grading jobs reference their source program and test files by URI. Two
//! schemes are supported:
//! - `base64://<payload>` - the payload is decoded as standard base64
//! - `http://` / `https://` - fetched with a GET request
//!
//! Submissions and test files are assumed small, so HTTP bodies are read
//! fully into memory. There is no retry and no caching; a failed fetch
//! surfaces to the pipeline, which reports `SYSTEM_FAIL_FETCH_FILE`.

mod error;

pub use error::FetchError;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use tracing::{debug, instrument};

/// URI prefix for inline base64 payloads.
const BASE64_SCHEME: &str = "base64://";

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Resolves `base64://` and `http(s)://` URIs to bytes.
///
/// Created once and reused across jobs so HTTP fetches share one connection
/// pool.
#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Creates a fetcher with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher that reuses an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Resolves a URI to its bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Base64`] for an undecodable `base64://` payload,
    /// [`FetchError::Network`] for transport failures, and
    /// [`FetchError::HttpStatus`] for any response status outside 2xx.
    #[instrument(skip(self))]
    pub async fn get(&self, uri: &str) -> Result<Vec<u8>> {
        if let Some(payload) = uri.strip_prefix(BASE64_SCHEME) {
            return BASE64.decode(payload).map_err(|e| FetchError::base64(uri, e));
        }

        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| FetchError::network(uri, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(uri, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::network(uri, e))?;

        debug!(uri, bytes = body.len(), "fetched");
        Ok(body.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_decodes_base64_uri() {
        let fetcher = Fetcher::new();
        let bytes = fetcher.get("base64://SGVsbG8h").await.unwrap();
        assert_eq!(bytes, b"Hello!");
    }

    #[tokio::test]
    async fn test_get_decodes_empty_base64_payload() {
        let fetcher = Fetcher::new();
        let bytes = fetcher.get("base64://").await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_get_rejects_invalid_base64() {
        let fetcher = Fetcher::new();
        let err = fetcher.get("base64://not base64!!").await.unwrap_err();
        assert!(matches!(err, FetchError::Base64 { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_get_reports_network_error_for_unresolvable_host() {
        let fetcher = Fetcher::new();
        let err = fetcher
            .get("http://nonexistent.invalid/file")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }), "got {err:?}");
    }
}
