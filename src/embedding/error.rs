//! Error types for the embedding module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for embedding operations
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Provider name not recognized
    #[error("Unsupported embedding provider: {0}")]
    UnsupportedProvider(String),

    /// Provider requires a credential that was not configured
    #[error("Missing API key for {0}")]
    MissingApiKey(String),

    /// Response body did not have the provider's expected shape
    #[error("Malformed {provider} response: {reason}")]
    MalformedResponse {
        /// Provider that sent the response
        provider: String,
        /// What was wrong with it
        reason: String,
    },

    /// Provider returned a different number of vectors than texts sent
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch {
        /// Texts sent
        expected: usize,
        /// Vectors received
        actual: usize,
    },

    /// URL construction error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl From<EmbedError> for CrateError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::MissingApiKey(_) | EmbedError::UrlParse(_) => {
                CrateError::Config(err.to_string())
            }
            _ => CrateError::Embedding(err.to_string()),
        }
    }
}
