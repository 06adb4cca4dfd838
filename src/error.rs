//! Error types for the docbridge crate

use thiserror::Error;

use crate::retry::ClassifiedError;

/// Result type for docbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for docbridge operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error outside of a retried request (client construction etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a document from disk failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request gave up, either because the failure could not be retried or
    /// because the retry budget ran out
    #[error("{operation} failed after {attempts} attempt(s): {cause}")]
    Request {
        /// Name of the operation that failed
        operation: String,
        /// Number of attempts made, including the first
        attempts: u32,
        /// The classified failure of the last attempt
        #[source]
        cause: ClassifiedError,
    },

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Embedding generation error
    #[error("Embedding error: {0}")]
    Embedding(String),
}

impl Error {
    /// The classified root cause, if this error came out of the retry loop
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Error::Request { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
