//! # Embedding Configuration
//!
//! Provider selection and connection settings for the embedding layer. Each
//! provider kind carries its own default model, endpoint, vector size and
//! batch limit, so a configuration only has to name the provider and a key.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::embedding::error::EmbedError;
use crate::error::{Error, Result};
use crate::partition::{env_var, parse_env};
use crate::retry::RetryPolicy;

/// Default Azure OpenAI REST API version
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// Default timeout for a single embedding request in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default request quota per minute
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 300;

/// Supported embedding vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    Cohere,
    Gemini,
    Ollama,
    Voyage,
}

impl EmbeddingProviderKind {
    /// All provider kinds
    pub const ALL: [EmbeddingProviderKind; 6] = [
        EmbeddingProviderKind::OpenAi,
        EmbeddingProviderKind::AzureOpenAi,
        EmbeddingProviderKind::Cohere,
        EmbeddingProviderKind::Gemini,
        EmbeddingProviderKind::Ollama,
        EmbeddingProviderKind::Voyage,
    ];

    /// Configuration name
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingProviderKind::OpenAi => "openai",
            EmbeddingProviderKind::AzureOpenAi => "azure_openai",
            EmbeddingProviderKind::Cohere => "cohere",
            EmbeddingProviderKind::Gemini => "gemini",
            EmbeddingProviderKind::Ollama => "ollama",
            EmbeddingProviderKind::Voyage => "voyage",
        }
    }

    /// Model used when none is configured
    ///
    /// For Azure this is the deployment name.
    pub fn default_model(&self) -> &'static str {
        match self {
            EmbeddingProviderKind::OpenAi | EmbeddingProviderKind::AzureOpenAi => {
                "text-embedding-3-small"
            }
            EmbeddingProviderKind::Cohere => "embed-english-v3.0",
            EmbeddingProviderKind::Gemini => "text-embedding-004",
            EmbeddingProviderKind::Ollama => "nomic-embed-text",
            EmbeddingProviderKind::Voyage => "voyage-3",
        }
    }

    /// Endpoint origin used when none is configured
    ///
    /// Azure has no public default; every resource has its own endpoint.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            EmbeddingProviderKind::OpenAi => Some("https://api.openai.com"),
            EmbeddingProviderKind::AzureOpenAi => None,
            EmbeddingProviderKind::Cohere => Some("https://api.cohere.ai"),
            EmbeddingProviderKind::Gemini => Some("https://generativelanguage.googleapis.com"),
            EmbeddingProviderKind::Ollama => Some("http://localhost:11434"),
            EmbeddingProviderKind::Voyage => Some("https://api.voyageai.com"),
        }
    }

    /// Vector size of the default model
    pub fn default_dimensions(&self) -> usize {
        match self {
            EmbeddingProviderKind::OpenAi | EmbeddingProviderKind::AzureOpenAi => 1536,
            EmbeddingProviderKind::Cohere | EmbeddingProviderKind::Voyage => 1024,
            EmbeddingProviderKind::Gemini | EmbeddingProviderKind::Ollama => 768,
        }
    }

    /// Largest number of texts the vendor accepts in one request
    pub fn max_batch_size(&self) -> usize {
        match self {
            EmbeddingProviderKind::OpenAi | EmbeddingProviderKind::AzureOpenAi => 2048,
            EmbeddingProviderKind::Cohere => 96,
            EmbeddingProviderKind::Gemini => 100,
            EmbeddingProviderKind::Ollama => 512,
            EmbeddingProviderKind::Voyage => 128,
        }
    }

    /// Whether requests carry an API key
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, EmbeddingProviderKind::Ollama)
    }

    /// Whether the vendor accepts a requested output size
    pub fn supports_dimensions(&self) -> bool {
        matches!(
            self,
            EmbeddingProviderKind::OpenAi
                | EmbeddingProviderKind::AzureOpenAi
                | EmbeddingProviderKind::Gemini
                | EmbeddingProviderKind::Voyage
        )
    }

    /// Vendor specific environment variable holding the API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            EmbeddingProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            EmbeddingProviderKind::AzureOpenAi => Some("AZURE_OPENAI_API_KEY"),
            EmbeddingProviderKind::Cohere => Some("COHERE_API_KEY"),
            EmbeddingProviderKind::Gemini => Some("GEMINI_API_KEY"),
            EmbeddingProviderKind::Ollama => None,
            EmbeddingProviderKind::Voyage => Some("VOYAGE_API_KEY"),
        }
    }
}

impl fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingProviderKind {
    type Err = EmbedError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "openai" => Ok(EmbeddingProviderKind::OpenAi),
            "azure_openai" | "azure" => Ok(EmbeddingProviderKind::AzureOpenAi),
            "cohere" => Ok(EmbeddingProviderKind::Cohere),
            "gemini" | "google" => Ok(EmbeddingProviderKind::Gemini),
            "ollama" => Ok(EmbeddingProviderKind::Ollama),
            "voyage" | "voyageai" => Ok(EmbeddingProviderKind::Voyage),
            _ => Err(EmbedError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Embedding layer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Vendor to call
    pub provider: EmbeddingProviderKind,

    /// Model name (Azure: deployment name)
    pub model: String,

    /// API key, required by every provider except Ollama
    pub api_key: Option<String>,

    /// Endpoint origin; `None` uses the provider default
    pub base_url: Option<String>,

    /// Requested vector size; `None` uses the model's native size
    pub dimensions: Option<usize>,

    /// Azure REST API version
    pub api_version: String,

    /// Texts per request
    pub batch_size: usize,

    /// Timeout for a single request
    pub timeout: Duration,

    /// Retry budget and backoff
    pub retry: RetryPolicy,

    /// Requests allowed per minute
    pub requests_per_minute: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::for_provider(EmbeddingProviderKind::default())
    }
}

impl EmbeddingConfig {
    /// Create a new builder
    pub fn builder() -> EmbeddingConfigBuilder {
        EmbeddingConfigBuilder::default()
    }

    /// Defaults for `provider`, without a key
    pub fn for_provider(provider: EmbeddingProviderKind) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            api_key: None,
            base_url: None,
            dimensions: None,
            api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            batch_size: provider.max_batch_size(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }

    /// Build a configuration from `EMBEDDING_*` environment variables
    ///
    /// The key falls back to the provider's own variable, such as
    /// `OPENAI_API_KEY`, when `EMBEDDING_API_KEY` is unset.
    pub fn from_env() -> Result<Self> {
        Self::env_builder()?.build()
    }

    /// Builder seeded from `EMBEDDING_*` environment variables
    pub fn env_builder() -> Result<EmbeddingConfigBuilder> {
        let provider = match env_var("EMBEDDING_PROVIDER") {
            Some(name) => name.parse::<EmbeddingProviderKind>()?,
            None => EmbeddingProviderKind::default(),
        };

        let mut builder = Self::builder().provider(provider);
        if let Some(model) = env_var("EMBEDDING_MODEL") {
            builder = builder.model(model);
        }
        let api_key = env_var("EMBEDDING_API_KEY")
            .or_else(|| provider.api_key_env().and_then(env_var));
        if let Some(api_key) = api_key {
            builder = builder.api_key(api_key);
        }
        if let Some(base_url) = env_var("EMBEDDING_BASE_URL") {
            builder = builder.base_url(base_url);
        }
        if let Some(dimensions) = env_var("EMBEDDING_DIMENSIONS") {
            builder = builder.dimensions(parse_env("EMBEDDING_DIMENSIONS", &dimensions)?);
        }
        if let Some(api_version) = env_var("EMBEDDING_API_VERSION") {
            builder = builder.api_version(api_version);
        }

        Ok(builder)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.provider.requires_api_key()
            && self.api_key.as_deref().is_none_or(|key| key.trim().is_empty())
        {
            return Err(EmbedError::MissingApiKey(self.provider.to_string()).into());
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("embedding model must not be empty".to_string()));
        }
        if self.provider == EmbeddingProviderKind::AzureOpenAi && self.base_url.is_none() {
            return Err(Error::Config(
                "azure_openai requires a base_url (the resource endpoint)".to_string(),
            ));
        }
        self.endpoint()?;
        if self.batch_size == 0 || self.batch_size > self.provider.max_batch_size() {
            return Err(Error::Config(format!(
                "batch_size must be between 1 and {} for {}",
                self.provider.max_batch_size(),
                self.provider
            )));
        }
        if self.dimensions == Some(0) {
            return Err(Error::Config("dimensions must be greater than zero".to_string()));
        }
        if self.requests_per_minute == 0 {
            return Err(Error::Config(
                "requests_per_minute must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Parsed endpoint origin, configured or default
    pub fn endpoint(&self) -> Result<Url> {
        let base = self
            .base_url
            .as_deref()
            .or_else(|| self.provider.default_base_url())
            .ok_or_else(|| Error::Config(format!("{} requires a base_url", self.provider)))?;
        Url::parse(base).map_err(|e| EmbedError::from(e).into())
    }

    /// Vector size produced by this configuration
    pub fn ndims(&self) -> usize {
        self.dimensions
            .unwrap_or_else(|| self.provider.default_dimensions())
    }
}

/// Builder for EmbeddingConfig
///
/// Provider defaults apply to anything not set explicitly, regardless of
/// call order.
#[derive(Debug, Default)]
pub struct EmbeddingConfigBuilder {
    provider: EmbeddingProviderKind,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    dimensions: Option<usize>,
    api_version: Option<String>,
    batch_size: Option<usize>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    requests_per_minute: Option<u32>,
}

impl EmbeddingConfigBuilder {
    /// Set the provider
    pub fn provider(mut self, provider: EmbeddingProviderKind) -> Self {
        self.provider = provider;
        self
    }

    /// Set the model (Azure: deployment name)
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the endpoint origin
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Request vectors of this size
    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Set the Azure REST API version
    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Set the number of texts per request
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry policy
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the request quota per minute
    pub fn requests_per_minute(mut self, requests_per_minute: u32) -> Self {
        self.requests_per_minute = Some(requests_per_minute);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<EmbeddingConfig> {
        let mut config = EmbeddingConfig::for_provider(self.provider);
        if let Some(model) = self.model {
            config.model = model;
        }
        config.api_key = self.api_key;
        config.base_url = self.base_url;
        config.dimensions = self.dimensions;
        if let Some(api_version) = self.api_version {
            config.api_version = api_version;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(retry) = self.retry {
            config.retry = retry;
        }
        if let Some(rpm) = self.requests_per_minute {
            config.requests_per_minute = rpm;
        }

        config.validate()?;
        Ok(config)
    }
}
