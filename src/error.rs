//! Error types for the Key-Value client

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when talking to the Key-Value API
#[derive(Error, Debug)]
pub enum Error {
    /// No token was passed and the client has no default token.
    /// Raised before any network call is made.
    #[error("Token is required")]
    MissingToken,

    /// A batch was empty or exceeded the per-request operation limit.
    /// Raised before any network call is made.
    #[error("Batch must contain between 1 and {max} operations, got {count}")]
    InvalidBatchSize {
        /// Number of operations that were passed
        count: usize,
        /// Maximum accepted by the server
        max: usize,
    },

    /// The `version` sent with a PATCH no longer matches the stored one (HTTP 409)
    #[error("Version conflict: {message}")]
    VersionConflict {
        /// Error message from the server
        message: String,
    },

    /// Token or data not found (HTTP 404)
    #[error("Not found: {message}")]
    NotFound {
        /// Error message from the server
        message: String,
    },

    /// Too many requests (HTTP 429)
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Error message from the server
        message: String,
        /// Seconds to wait, from the `Retry-After` header
        retry_after: Option<u64>,
    },

    /// Request body rejected as too large (HTTP 413)
    #[error("Payload too large: {message}")]
    PayloadTooLarge {
        /// Error message from the server
        message: String,
    },

    /// Any other non-2xx response, or a 2xx response with `"success": false`
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the server
        message: String,
        /// Raw JSON body, when the server sent one
        body: Option<Value>,
    },

    /// The request did not complete within the configured timeout
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout that was exceeded
        timeout_ms: u64,
    },

    /// Network failure: DNS, refused connection, TLS handshake, broken stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request could not be built locally (bad header value, unencodable body)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A successful response carried a body that could not be decoded
    #[error("Invalid response: {0}")]
    Decode(String),

    /// Base URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// TLS configuration error
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// HTTP status code for errors reported by the server
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::VersionConflict { .. } => Some(409),
            Error::NotFound { .. } => Some(404),
            Error::RateLimited { .. } => Some(429),
            Error::PayloadTooLarge { .. } => Some(413),
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the caller can re-read the current version and retry the PATCH
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, Error::VersionConflict { .. })
    }

    /// Field-level validation details from a 400 response, if the server sent any.
    ///
    /// Looks at `validationErrors` first and falls back to `details`.
    pub fn validation_errors(&self) -> Option<&Value> {
        match self {
            Error::Api {
                status: 400,
                body: Some(body),
                ..
            } => body
                .get("validationErrors")
                .or_else(|| body.get("details"))
                .filter(|v| !v.is_null()),
            _ => None,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
