//! Error types for Keynote

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Keynote operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Keynote operations
#[derive(Error, Debug)]
pub enum Error {
    /// Deployment or programmer mistake (bad chunk sizes, dimension mismatch)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid input provided
    #[error("invalid input: {0}")]
    Validation(String),

    /// Derived artifacts disagree (e.g. embedding count vs chunk count)
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Embedding provider call failed
    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        /// Whether a retry may succeed (rate limits, timeouts, 5xx)
        transient: bool,
    },

    /// Failed to read from or write to the chunk store
    #[error("store error: {0}")]
    Store(String),

    /// Transaction commit failed
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Operation exceeded its deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Shorthand for a non-retryable embedding failure.
    pub fn embedding(message: impl Into<String>) -> Self {
        Error::Embedding {
            message: message.into(),
            transient: false,
        }
    }

    /// Shorthand for an embedding failure worth retrying.
    pub fn transient_embedding(message: impl Into<String>) -> Self {
        Error::Embedding {
            message: message.into(),
            transient: true,
        }
    }

    /// Returns `true` when the operation may succeed if attempted again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Embedding {
                transient: true,
                ..
            } | Error::Timeout(_)
        )
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Store(format!("metadata encoding: {err}"))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout() || err.is_connect() || err.is_request() || err.is_body();
        Error::Embedding {
            message: err.to_string(),
            transient,
        }
    }
}
