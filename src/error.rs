//! Error types for webimage-dl
//!
//! Two layers of failure are modelled here:
//! - [`Error`] covers failures of the library API itself (bad configuration,
//!   creating tasks on a torn-down downloader, malformed URLs).
//! - [`TransportError`] covers failures reported by the transport collaborator
//!   for a single operation. These never surface as `Err` values from the API;
//!   they are delivered to observers and completion handlers inside
//!   [`DownloadResult::NetworkError`](crate::types::DownloadResult::NetworkError).

use thiserror::Error;

/// Result type alias for webimage-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for webimage-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_processing")
        key: Option<String>,
    },

    /// A request URL could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The downloader (or its transport) has been invalidated - no new tasks accepted
    #[error("downloader invalidated: not accepting new tasks")]
    ShuttingDown,

    /// The downloader was constructed outside of a tokio runtime
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// Transport-level failure outside of any single operation (e.g., client construction)
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::ShuttingDown => "shutting_down",
            Error::NoRuntime(_) => "no_runtime",
            Error::Transport(e) => e.error_code(),
            Error::Serialization(_) => "serialization_error",
        }
    }
}

/// Failure of a single transport operation
///
/// Cloneable so that the same failure can be shown to the observer and then
/// handed by value to the task's completion handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The operation was cancelled by its owner (or vetoed by the observer)
    #[error("operation cancelled")]
    Cancelled,

    /// Could not establish a connection to the remote host
    #[error("connection failed: {0}")]
    Connection(String),

    /// The transport's own timeout elapsed
    #[error("request timed out")]
    TimedOut,

    /// The response body could not be read to completion
    #[error("failed to read response body: {0}")]
    Body(String),

    /// Any other transport failure
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether this error denotes operator-initiated cancellation rather than a
    /// genuine network failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            TransportError::Cancelled => "cancelled",
            TransportError::Connection(_) => "connection_failed",
            TransportError::TimedOut => "timed_out",
            TransportError::Body(_) => "body_error",
            TransportError::Other(_) => "network_error",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::TimedOut
        } else if e.is_connect() {
            TransportError::Connection(e.to_string())
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}
