//! HTTP client for embedding vendors

use std::sync::Arc;

use reqwest::Client as ReqwestClient;
use rig::embeddings::{Embedding, EmbeddingError, EmbeddingModel};
use tracing::{debug, info, instrument};

use crate::embedding::config::EmbeddingConfig;
use crate::embedding::error::EmbedError;
use crate::embedding::providers::{build_request, parse_embeddings, EmbedPurpose};
use crate::error::Result;
use crate::retry::{retry_with_backoff, send_json};

/// Embedding client for one configured provider
///
/// Requests are split into batches of `batch_size` texts; each batch is one
/// HTTP request retried with the configured policy. Clones share the
/// connection pool and configuration.
#[derive(Clone, Debug)]
pub struct EmbeddingClient {
    http: ReqwestClient,
    config: Arc<EmbeddingConfig>,
    purpose: EmbedPurpose,
}

impl EmbeddingClient {
    /// Create a client embedding documents
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        config.validate()?;

        let http = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(concat!("docbridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            config: Arc::new(config),
            purpose: EmbedPurpose::Document,
        })
    }

    /// Create a client from `EMBEDDING_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(EmbeddingConfig::from_env()?)
    }

    /// A client sharing this one's connection pool with a different purpose
    pub fn with_purpose(&self, purpose: EmbedPurpose) -> Self {
        Self {
            purpose,
            ..self.clone()
        }
    }

    /// The client's configuration
    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Purpose sent with every request
    pub fn purpose(&self) -> EmbedPurpose {
        self.purpose
    }

    /// Embed `texts`, batching as needed
    ///
    /// Vectors come back in input order. An empty input makes no request.
    #[instrument(skip(self, texts), fields(count = texts.len(), provider = %self.config.provider), level = "debug")]
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    /// Embed one batch in a single request
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = build_request(&self.config, texts, self.purpose)?;
        let operation = format!("{} embedding", self.config.provider);
        let name = operation.as_str();

        let body = retry_with_backoff(&self.config.retry, name, |attempt| {
            debug!(
                "Requesting {} embeddings from {} (attempt {})",
                texts.len(),
                self.config.provider,
                attempt
            );
            let builder = request.headers.iter().fold(
                self.http.post(request.url.clone()).json(&request.body),
                |builder, (name, value)| builder.header(*name, value),
            );
            async move { send_json(builder, name).await }
        })
        .await?;

        let vectors = parse_embeddings(self.config.provider, body)?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            }
            .into());
        }

        info!(
            "Generated {} embeddings with {} dimensions",
            vectors.len(),
            vectors.first().map_or(0, Vec::len)
        );
        Ok(vectors)
    }
}

impl EmbeddingModel for EmbeddingClient {
    const MAX_DOCUMENTS: usize = 1024;

    fn ndims(&self) -> usize {
        self.config.ndims()
    }

    async fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> std::result::Result<Vec<Embedding>, EmbeddingError> {
        let documents: Vec<String> = texts.into_iter().collect();
        let vectors = self
            .embed(&documents)
            .await
            .map_err(|e| EmbeddingError::ProviderError(e.to_string()))?;

        Ok(documents
            .into_iter()
            .zip(vectors)
            .map(|(document, vec)| Embedding { document, vec })
            .collect())
    }
}
