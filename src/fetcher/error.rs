//! Error types for the fetcher module.

use thiserror::Error;

/// Errors that can occur while resolving a job URI to bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The `base64://` payload is not valid standard base64.
    #[error("invalid base64 payload in {uri}: {source}")]
    Base64 {
        /// The URI whose payload failed to decode.
        uri: String,
        /// The underlying decode error.
        #[source]
        source: base64::DecodeError,
    },

    /// Network-level error (DNS resolution, connection refused, TLS, etc.)
    #[error("network error fetching {uri}: {source}")]
    Network {
        /// The URI that failed to fetch.
        uri: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP response with a status outside the 2xx range.
    #[error("HTTP {status} fetching {uri}")]
    HttpStatus {
        /// The URI that returned an error status.
        uri: String,
        /// The HTTP status code.
        status: u16,
    },
}

impl FetchError {
    /// Creates a base64 decode error.
    pub fn base64(uri: impl Into<String>, source: base64::DecodeError) -> Self {
        Self::Base64 {
            uri: uri.into(),
            source,
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(uri: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            uri: uri.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(uri: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            uri: uri.into(),
            status,
        }
    }
}
