//! Error types for the parley crate

use thiserror::Error;

/// Result type for parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for backend, store and configuration lookups
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Upstream rate limit or quota exceeded
    #[error("Rate limit exceeded. Please retry after {retry_after_secs} seconds")]
    RateLimit {
        /// Seconds to wait before retrying
        retry_after_secs: u64,
    },

    /// An external call did not finish in time
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        /// What was being waited on
        operation: &'static str,
        /// The bound that was exceeded
        after_ms: u64,
    },

    /// A model name with no configured limits
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Counter store error
    #[error("Store error: {0}")]
    Store(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a failed backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Credentials were rejected
    Auth,
    /// The upstream quota or rate limit was hit
    Quota,
    /// Anything else: network, malformed response, server error
    Generic,
}

impl Error {
    /// Classify this error for caller-facing handling.
    pub fn kind(&self) -> BackendErrorKind {
        match self {
            Error::Auth(_) => BackendErrorKind::Auth,
            Error::Api { status_code: 401, .. } => BackendErrorKind::Auth,
            Error::RateLimit { .. } => BackendErrorKind::Quota,
            Error::Api { status_code: 429, .. } => BackendErrorKind::Quota,
            Error::Api { message, .. } if message.contains("RESOURCE_EXHAUSTED") => {
                BackendErrorKind::Quota
            }
            _ => BackendErrorKind::Generic,
        }
    }

    pub(crate) fn timeout(operation: &'static str, after: std::time::Duration) -> Self {
        Error::Timeout {
            operation,
            after_ms: after.as_millis() as u64,
        }
    }
}

impl From<libsql::Error> for Error {
    fn from(err: libsql::Error) -> Self {
        Error::Store(err.to_string())
    }
}
