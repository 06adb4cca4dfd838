//! # Partition Client Configuration
//!
//! Connection settings for the document partitioning service. The deployment
//! mode picks the endpoint and request quota defaults: the hosted service is
//! throttled much harder than a self-hosted container.
//!
//! ## Key Components
//!
//! - `DeploymentMode`: hosted or self-hosted service
//! - `PartitionConfig`: endpoint, credential, timeout, retry and quota settings
//! - `PartitionConfigBuilder`: builder with mode aware defaults

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Partition endpoint of the hosted service
pub const HOSTED_API_URL: &str = "https://api.unstructuredapp.io/general/v0/general";

/// Partition endpoint of a default self-hosted container
pub const SELF_HOSTED_API_URL: &str = "http://localhost:8000/general/v0/general";

/// Requests per minute allowed against the hosted service
pub const HOSTED_REQUESTS_PER_MINUTE: u32 = 10;

/// Requests per minute allowed against a self-hosted deployment
pub const SELF_HOSTED_REQUESTS_PER_MINUTE: u32 = 100;

/// Default timeout for a single partition request in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Where the partitioning service runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// The vendor's hosted API; requires an API key
    #[default]
    Hosted,

    /// A self-hosted container; the API key is optional
    SelfHosted,
}

impl DeploymentMode {
    /// Default partition endpoint for this mode
    pub fn default_api_url(&self) -> &'static str {
        match self {
            DeploymentMode::Hosted => HOSTED_API_URL,
            DeploymentMode::SelfHosted => SELF_HOSTED_API_URL,
        }
    }

    /// Default request quota per minute for this mode
    pub fn default_requests_per_minute(&self) -> u32 {
        match self {
            DeploymentMode::Hosted => HOSTED_REQUESTS_PER_MINUTE,
            DeploymentMode::SelfHosted => SELF_HOSTED_REQUESTS_PER_MINUTE,
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hosted" | "saas" | "api" => Ok(DeploymentMode::Hosted),
            "self_hosted" | "self-hosted" | "selfhosted" | "local" => {
                Ok(DeploymentMode::SelfHosted)
            }
            other => Err(Error::Config(format!(
                "unknown deployment mode '{}' (expected hosted|self_hosted)",
                other
            ))),
        }
    }
}

/// Configuration for the partition client
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Hosted or self-hosted deployment
    pub mode: DeploymentMode,

    /// Full URL of the partition endpoint
    pub api_url: String,

    /// API key sent in the `unstructured-api-key` header
    pub api_key: Option<String>,

    /// Timeout applied to each request
    pub timeout: Duration,

    /// Retry budget and backoff
    pub retry: RetryPolicy,

    /// Request quota per 60 second window
    pub requests_per_minute: u32,

    /// Requests allowed in flight at once
    pub max_concurrent: usize,

    /// User agent to use for requests
    pub user_agent: String,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self::for_mode(DeploymentMode::default())
    }
}

impl PartitionConfig {
    /// Create a new builder
    pub fn builder() -> PartitionConfigBuilder {
        PartitionConfigBuilder::new()
    }

    /// Defaults for the given deployment mode
    pub fn for_mode(mode: DeploymentMode) -> Self {
        Self {
            mode,
            api_url: mode.default_api_url().to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            requests_per_minute: mode.default_requests_per_minute(),
            max_concurrent: 1,
            user_agent: format!("docbridge/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Load configuration from `UNSTRUCTURED_*` environment variables
    ///
    /// Unset variables keep the defaults of the selected deployment mode.
    pub fn from_env() -> Result<Self> {
        Self::env_builder()?.build()
    }

    /// Builder seeded from `UNSTRUCTURED_*` environment variables, for
    /// callers that layer their own overrides on top
    pub fn env_builder() -> Result<PartitionConfigBuilder> {
        let mut builder = Self::builder();

        if let Some(mode) = env_var("UNSTRUCTURED_DEPLOYMENT") {
            builder = builder.mode(mode.parse()?);
        }
        if let Some(url) = env_var("UNSTRUCTURED_API_URL") {
            builder = builder.api_url(url);
        }
        if let Some(key) = env_var("UNSTRUCTURED_API_KEY") {
            builder = builder.api_key(key);
        }
        if let Some(secs) = env_var("UNSTRUCTURED_TIMEOUT_SECS") {
            builder = builder.timeout(Duration::from_secs(parse_env(
                "UNSTRUCTURED_TIMEOUT_SECS",
                &secs,
            )?));
        }
        if let Some(retries) = env_var("UNSTRUCTURED_MAX_RETRIES") {
            builder = builder.max_retries(parse_env("UNSTRUCTURED_MAX_RETRIES", &retries)?);
        }
        if let Some(rpm) = env_var("UNSTRUCTURED_REQUESTS_PER_MINUTE") {
            builder =
                builder.requests_per_minute(parse_env("UNSTRUCTURED_REQUESTS_PER_MINUTE", &rpm)?);
        }

        Ok(builder)
    }

    /// Check that the configuration can be used to make requests
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api_url)
            .map_err(|e| Error::Config(format!("invalid api_url '{}': {}", self.api_url, e)))?;

        if self.mode == DeploymentMode::Hosted
            && self.api_key.as_deref().is_none_or(|k| k.trim().is_empty())
        {
            return Err(Error::Config(
                "an API key is required for the hosted deployment".to_string(),
            ));
        }
        if self.requests_per_minute == 0 {
            return Err(Error::Config(
                "requests_per_minute must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(Error::Config(
                "max_concurrent must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// URL of the service health endpoint, on the same origin as `api_url`
    pub fn healthcheck_url(&self) -> Result<Url> {
        let api_url = Url::parse(&self.api_url)
            .map_err(|e| Error::Config(format!("invalid api_url '{}': {}", self.api_url, e)))?;
        api_url
            .join("/healthcheck")
            .map_err(|e| Error::Config(format!("invalid healthcheck url: {}", e)))
    }
}

/// Builder for PartitionConfig
///
/// Endpoint and quota fall back to the defaults of the chosen mode unless set
/// explicitly, regardless of call order.
#[derive(Debug, Default)]
pub struct PartitionConfigBuilder {
    mode: DeploymentMode,
    api_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    max_retries: Option<u32>,
    requests_per_minute: Option<u32>,
    max_concurrent: Option<usize>,
    user_agent: Option<String>,
}

impl PartitionConfigBuilder {
    /// Create a new builder for the hosted deployment
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deployment mode
    pub fn mode(mut self, mode: DeploymentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the partition endpoint
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace the whole retry policy
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the number of retries after the first attempt
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the request quota per minute
    pub fn requests_per_minute(mut self, requests_per_minute: u32) -> Self {
        self.requests_per_minute = Some(requests_per_minute);
        self
    }

    /// Set how many requests may be in flight at once
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = Some(max_concurrent);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<PartitionConfig> {
        let mut config = PartitionConfig::for_mode(self.mode);

        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }
        config.api_key = self.api_key;
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(retry) = self.retry {
            config.retry = retry;
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if let Some(rpm) = self.requests_per_minute {
            config.requests_per_minute = rpm;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.max_concurrent = max_concurrent;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }

        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid value '{}' for {}: {}", value, name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_mode_defaults() {
        let hosted = PartitionConfig::for_mode(DeploymentMode::Hosted);
        assert_eq!(hosted.api_url, HOSTED_API_URL);
        assert_eq!(hosted.requests_per_minute, 10);
        assert_eq!(hosted.max_concurrent, 1);
        assert_eq!(hosted.retry.max_retries, 3);

        let local = PartitionConfig::for_mode(DeploymentMode::SelfHosted);
        assert_eq!(local.api_url, SELF_HOSTED_API_URL);
        assert_eq!(local.requests_per_minute, 100);
    }

    #[test]
    fn test_builder_mode_order_does_not_matter() {
        let config = PartitionConfig::builder()
            .api_url("http://partition.internal:9000/general/v0/general")
            .requests_per_minute(42)
            .mode(DeploymentMode::SelfHosted)
            .max_retries(1)
            .build()
            .unwrap();

        assert_eq!(config.mode, DeploymentMode::SelfHosted);
        assert_eq!(
            config.api_url,
            "http://partition.internal:9000/general/v0/general"
        );
        assert_eq!(config.requests_per_minute, 42);
        assert_eq!(config.retry.max_retries, 1);
    }

    #[test]
    fn test_hosted_requires_api_key() {
        let result = PartitionConfig::builder().build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = PartitionConfig::builder().api_key("   ").build();
        assert!(matches!(result, Err(Error::Config(_))));

        let config = PartitionConfig::builder().api_key("secret").build().unwrap();
        assert_eq!(config.api_key.as_deref(), Some("secret"));

        // self-hosted works without one
        assert!(PartitionConfig::builder()
            .mode(DeploymentMode::SelfHosted)
            .build()
            .is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let base = || PartitionConfig::builder().mode(DeploymentMode::SelfHosted);

        assert_ok!(base().build());
        assert_err!(base().api_url("not a url").build());
        assert_err!(base().requests_per_minute(0).build());
        assert_err!(base().max_concurrent(0).build());
        assert_err!(base().timeout(Duration::ZERO).build());
    }

    #[test]
    fn test_deployment_mode_parsing() {
        assert_eq!(
            "hosted".parse::<DeploymentMode>().unwrap(),
            DeploymentMode::Hosted
        );
        assert_eq!(
            "Self-Hosted".parse::<DeploymentMode>().unwrap(),
            DeploymentMode::SelfHosted
        );
        assert_eq!(
            "self_hosted".parse::<DeploymentMode>().unwrap(),
            DeploymentMode::SelfHosted
        );
        assert!("cloud9".parse::<DeploymentMode>().is_err());
    }

    #[test]
    fn test_healthcheck_url_uses_origin() {
        let config = PartitionConfig::builder()
            .mode(DeploymentMode::SelfHosted)
            .api_url("http://localhost:8000/general/v0/general")
            .build()
            .unwrap();
        assert_eq!(
            config.healthcheck_url().unwrap().as_str(),
            "http://localhost:8000/healthcheck"
        );
    }

    #[test]
    fn test_parse_env_reports_variable() {
        let result: Result<u32> = parse_env("UNSTRUCTURED_MAX_RETRIES", "many");
        let message = result.unwrap_err().to_string();
        assert!(message.contains("UNSTRUCTURED_MAX_RETRIES"));
        assert!(message.contains("many"));
    }
}
