//! # Embedding Module
//!
//! A single interface over several text embedding vendors. The provider is
//! picked by configuration; callers only see texts going in and `f32`
//! vectors coming out.
//!
//! ## Key Components
//!
//! - `Embedder`: document and query embedding behind one rate limit
//! - `EmbeddingClient`: per-provider HTTP client with batching and retries,
//!   usable directly as a `rig` embedding model
//! - `RateLimitedEmbeddingModel`: token bucket wrapper for any `rig`
//!   embedding model
//! - `EmbeddingConfig`: provider, model, credential and limits
//!
//! ## Features
//!
//! - OpenAI, Azure OpenAI, Cohere, Gemini, Ollama and Voyage
//! - Query and document purposes for retrieval-tuned models
//! - Batches sized to each vendor's limit, results kept in input order
//! - Error classification and retry shared with the partition client

mod client;
mod config;
mod error;
mod providers;
mod ratelimited;

pub use client::EmbeddingClient;
pub use config::{
    EmbeddingConfig, EmbeddingConfigBuilder, EmbeddingProviderKind, DEFAULT_AZURE_API_VERSION,
};
pub use error::EmbedError;
pub use providers::EmbedPurpose;
pub use ratelimited::RateLimitedEmbeddingModel;

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use rig::embeddings::EmbeddingModel;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Embeds documents and queries with the configured provider
///
/// Both purposes draw from one per-minute quota. Each batch sent to the
/// vendor takes one token. Failures keep their [`Error::Request`] form, so
/// [`Error::classified`] works on them.
#[derive(Clone)]
pub struct Embedder {
    documents: RateLimitedEmbeddingModel<EmbeddingClient>,
    queries: RateLimitedEmbeddingModel<EmbeddingClient>,
    batch_size: usize,
}

impl Embedder {
    /// Create an embedder for `config`
    pub fn from_config(config: EmbeddingConfig) -> Result<Self> {
        let quota = NonZeroU32::new(config.requests_per_minute).ok_or_else(|| {
            Error::Config("requests_per_minute must be greater than zero".to_string())
        })?;
        let batch_size = config.batch_size;
        let client = EmbeddingClient::new(config)?;
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(quota)));

        Ok(Self {
            queries: RateLimitedEmbeddingModel::shared(
                client.with_purpose(EmbedPurpose::Query),
                limiter.clone(),
            ),
            documents: RateLimitedEmbeddingModel::shared(client, limiter),
            batch_size,
        })
    }

    /// Create an embedder from `EMBEDDING_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(EmbeddingConfig::from_env()?)
    }

    /// Provider in use
    pub fn provider(&self) -> EmbeddingProviderKind {
        self.documents.inner().config().provider
    }

    /// Vector size produced
    pub fn ndims(&self) -> usize {
        self.documents.ndims()
    }

    /// Embed passages for indexing, one vector per text in input order
    #[instrument(skip(self, texts), fields(count = texts.len()), level = "debug")]
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!("Embedding batch of {} documents", batch.len());
            self.documents.ready().await;
            let embeddings = self.documents.inner().embed_batch(batch).await?;
            vectors.extend(embeddings.iter().map(|vec| to_f32(vec)));
        }
        Ok(vectors)
    }

    /// Embed a search query
    #[instrument(skip(self, query), level = "debug")]
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.queries.ready().await;
        let embeddings = self
            .queries
            .inner()
            .embed_batch(&[query.to_string()])
            .await?;

        embeddings
            .first()
            .map(|vec| to_f32(vec))
            .ok_or_else(|| Error::Embedding("provider returned no embedding for query".to_string()))
    }
}

fn to_f32(vec: &[f64]) -> Vec<f32> {
    vec.iter().map(|f| *f as f32).collect()
}
