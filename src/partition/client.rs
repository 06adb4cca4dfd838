//! HTTP client for the document partitioning service
//!
//! Each outbound request passes through the client's [`RequestLimiter`] and
//! is retried according to the configured [`RetryPolicy`](crate::retry::RetryPolicy).

use std::path::Path;

use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::Client as ReqwestClient;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::partition::config::PartitionConfig;
use crate::partition::element::{transform_elements, ProcessedElement};
use crate::partition::mime::{is_supported, mime_for};
use crate::partition::params::ProcessingParams;
use crate::retry::{
    retry_after_from_headers, retry_with_backoff, send_json, ClassifiedError, ErrorKind,
    RequestLimiter, RetryPolicy,
};

/// Header carrying the API key
const API_KEY_HEADER: &str = "unstructured-api-key";

/// Client for the partition endpoint
///
/// Clones share the HTTP connection pool and the request limiter.
#[derive(Clone, Debug)]
pub struct PartitionClient {
    client: ReqwestClient,
    config: PartitionConfig,
    limiter: RequestLimiter,
}

impl PartitionClient {
    /// Create a client with its own request limiter
    pub fn new(config: PartitionConfig) -> Result<Self> {
        let limiter = RequestLimiter::new(config.requests_per_minute, config.max_concurrent)?;
        Self::with_limiter(config, limiter)
    }

    /// Create a client that shares an existing request limiter
    pub fn with_limiter(config: PartitionConfig, limiter: RequestLimiter) -> Result<Self> {
        config.validate()?;

        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    /// Create a client from `UNSTRUCTURED_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(PartitionConfig::from_env()?)
    }

    /// The client's configuration
    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// The limiter gating this client's requests
    pub fn limiter(&self) -> &RequestLimiter {
        &self.limiter
    }

    /// Partition a document held in memory
    ///
    /// # Arguments
    ///
    /// * `file_bytes` - The raw document
    /// * `file_name` - Name used to derive the MIME type and reported to the service
    /// * `params` - Partitioning options
    ///
    /// # Returns
    ///
    /// Every element the service extracted, or an error once retries are
    /// exhausted or the failure cannot be retried
    #[instrument(skip(self, file_bytes, params), fields(bytes = file_bytes.len()), level = "debug")]
    pub async fn process_document(
        &self,
        file_bytes: &[u8],
        file_name: &str,
        params: &ProcessingParams,
    ) -> Result<Vec<ProcessedElement>> {
        if file_bytes.is_empty() {
            return Err(Error::InvalidRequest(format!(
                "document '{}' is empty",
                file_name
            )));
        }

        let mime = mime_for(file_name);
        if !is_supported(file_name) {
            warn!(
                "File type of '{}' is not known to the partition service; sending as {}",
                file_name, mime
            );
        }

        let fields = params.form_fields();
        let payload = retry_with_backoff(&self.config.retry, "partition", |attempt| {
            let form = build_form(file_bytes, file_name, &mime, &fields);
            async move {
                debug!("Sending partition request for {} (attempt {})", file_name, attempt);
                self.gated(self.send_partition(form)).await
            }
        })
        .await?;

        let elements = transform_elements(&payload);
        info!("Extracted {} elements from {}", elements.len(), file_name);
        Ok(elements)
    }

    /// Partition a document read from disk
    #[instrument(skip(self, params), level = "debug")]
    pub async fn process_file(
        &self,
        path: impl AsRef<Path> + std::fmt::Debug,
        params: &ProcessingParams,
    ) -> Result<Vec<ProcessedElement>> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::InvalidRequest(format!("'{}' has no usable file name", path.display()))
            })?
            .to_string();

        let file_bytes = tokio::fs::read(path).await?;
        self.process_document(&file_bytes, &file_name, params).await
    }

    /// Check that the service is up
    ///
    /// A single gated attempt without retries.
    #[instrument(skip(self), level = "debug")]
    pub async fn health_check(&self) -> Result<()> {
        let url = self.config.healthcheck_url()?;
        let policy = RetryPolicy::with_max_retries(0);

        retry_with_backoff(&policy, "healthcheck", |_| {
            let url = url.clone();
            async move {
                self.gated(async {
                    let response = self
                        .authorized(self.client.get(url))
                        .send()
                        .await
                        .map_err(|e| ClassifiedError::from_reqwest(&e))?;
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let retry_after = retry_after_from_headers(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    Err(ClassifiedError::from_status(status, &body, retry_after))
                })
                .await
            }
        })
        .await
    }

    /// Run one attempt behind the limiter
    async fn gated<F, T>(&self, attempt: F) -> std::result::Result<T, ClassifiedError>
    where
        F: std::future::Future<Output = std::result::Result<T, ClassifiedError>>,
    {
        self.limiter
            .run(attempt)
            .await
            .unwrap_or_else(|e| Err(ClassifiedError::new(ErrorKind::Unknown, e.to_string())))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(api_key) => request.header(API_KEY_HEADER, api_key),
            None => request,
        }
    }

    /// Send a single partition request and decode the JSON body
    async fn send_partition(&self, form: Form) -> std::result::Result<Value, ClassifiedError> {
        let request = self
            .client
            .post(&self.config.api_url)
            .header(ACCEPT, "application/json")
            .multipart(form);

        send_json(self.authorized(request), "partition").await
    }
}

/// Build the multipart form for one attempt
///
/// Forms are consumed by sending, so every attempt gets a fresh one.
fn build_form(
    file_bytes: &[u8],
    file_name: &str,
    mime: &str,
    fields: &[(&'static str, String)],
) -> Form {
    let part = || Part::bytes(file_bytes.to_vec()).file_name(file_name.to_string());
    let file_part = part().mime_str(mime).unwrap_or_else(|e| {
        warn!("Invalid MIME type {}: {}", mime, e);
        part()
    });

    fields
        .iter()
        .fold(Form::new(), |form, (name, value)| {
            form.text(*name, value.clone())
        })
        .part("files", file_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::config::DeploymentMode;
    use crate::partition::element::ElementType;
    use crate::partition::params::PartitionStrategy;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    const PARTITION_PATH: &str = "/general/v0/general";

    fn test_client(base_url: &str, max_retries: u32) -> PartitionClient {
        let config = PartitionConfig::builder()
            .mode(DeploymentMode::SelfHosted)
            .api_url(format!("{}{}", base_url, PARTITION_PATH))
            .api_key("test-key")
            .requests_per_minute(1000)
            .retry_policy(RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            })
            .build()
            .unwrap();
        PartitionClient::new(config).unwrap()
    }

    const ELEMENTS_BODY: &str = r#"[
        {"type": "Title", "element_id": "t1", "text": "Quarterly Report",
         "metadata": {"page_number": 1, "filename": "report.pdf",
                      "coordinates": {"points": [[10, 10], [200, 10], [200, 40], [10, 40]],
                                      "system": "PixelSpace", "layout_width": 612, "layout_height": 792}}},
        {"type": "NarrativeText", "element_id": "n1", "text": "Revenue grew.",
         "metadata": {"page_number": 1, "filename": "report.pdf"}}
    ]"#;

    #[tokio::test]
    async fn test_process_document_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PARTITION_PATH)
            .match_header("unstructured-api-key", "test-key")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="strategy""#.to_string()),
                Matcher::Regex("hi_res".to_string()),
                Matcher::Regex(r#"filename="report.pdf""#.to_string()),
                Matcher::Regex("application/pdf".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ELEMENTS_BODY)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url(), 2);
        let params = ProcessingParams::builder()
            .strategy(PartitionStrategy::HiRes)
            .coordinates(true)
            .build();

        let elements = client
            .process_document(b"%PDF-1.7 fake", "report.pdf", &params)
            .await
            .unwrap();

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].element_type, ElementType::Title);
        assert_eq!(elements[0].page_number, Some(1));
        let bbox = elements[0].bbox.unwrap();
        assert_eq!((bbox.x1, bbox.y1, bbox.x2, bbox.y2), (10.0, 10.0, 200.0, 40.0));
        assert_eq!(elements[1].element_type, ElementType::NarrativeText);
        assert!(elements[1].bbox.is_none());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retries_server_error_then_succeeds() {
        let mut server = Server::new_async().await;

        let mock_failure = server
            .mock("POST", PARTITION_PATH)
            .with_status(503)
            .with_body("upstream unavailable")
            .expect(1)
            .create_async()
            .await;

        let mock_success = server
            .mock("POST", PARTITION_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ELEMENTS_BODY)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url(), 2);
        let elements = client
            .process_document(b"hello", "notes.txt", &ProcessingParams::default())
            .await
            .unwrap();
        assert_eq!(elements.len(), 2);

        mock_failure.assert_async().await;
        mock_success.assert_async().await;
    }

    #[tokio::test]
    async fn test_quota_exceeded_waits_for_retry_after() {
        let mut server = Server::new_async().await;

        let mock_throttled = server
            .mock("POST", PARTITION_PATH)
            .with_status(429)
            .with_header("retry-after", "1")
            .with_body(r#"{"detail": "Too many requests"}"#)
            .expect(1)
            .create_async()
            .await;

        let mock_success = server
            .mock("POST", PARTITION_PATH)
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        // The test policy backs off for at most 5ms, so only the hint explains
        // a full second between attempts.
        let client = test_client(&server.url(), 1);
        let started = std::time::Instant::now();
        let elements = client
            .process_document(b"hello", "notes.txt", &ProcessingParams::default())
            .await
            .unwrap();
        assert!(elements.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(1));

        mock_throttled.assert_async().await;
        mock_success.assert_async().await;
    }

    #[tokio::test]
    async fn test_oversized_retry_after_does_not_panic() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PARTITION_PATH)
            .with_status(429)
            .with_header("retry-after", "1e20")
            .with_body(r#"{"detail": "Too many requests"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url(), 0);
        let error = client
            .process_document(b"hello", "notes.txt", &ProcessingParams::default())
            .await
            .unwrap_err();

        let cause = error.classified().unwrap();
        assert_eq!(cause.kind, ErrorKind::QuotaExceeded);
        assert_eq!(cause.retry_after, Some(Duration::from_secs(3600)));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_authentication_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PARTITION_PATH)
            .with_status(401)
            .with_body(r#"{"detail": "API key is invalid"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url(), 3);
        let error = client
            .process_document(b"hello", "notes.txt", &ProcessingParams::default())
            .await
            .unwrap_err();

        let cause = error.classified().unwrap();
        assert_eq!(cause.kind, ErrorKind::AuthenticationError);
        assert!(!cause.retryable);
        assert!(cause.message.contains("API key is invalid"));
        assert!(matches!(error, Error::Request { attempts: 1, .. }));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_budget() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PARTITION_PATH)
            .with_status(500)
            .with_body("boom")
            .expect(3)
            .create_async()
            .await;

        let client = test_client(&server.url(), 2);
        let error = client
            .process_document(b"hello", "notes.txt", &ProcessingParams::default())
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Request { attempts: 3, .. }));
        assert_eq!(error.classified().unwrap().kind, ErrorKind::ServerError);
        assert!(error.to_string().starts_with("partition failed after 3 attempt(s)"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_json_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PARTITION_PATH)
            .with_status(200)
            .with_body("<html>not json</html>")
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url(), 3);
        let error = client
            .process_document(b"hello", "notes.txt", &ProcessingParams::default())
            .await
            .unwrap_err();
        assert_eq!(error.classified().unwrap().kind, ErrorKind::Unknown);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_document_is_rejected_locally() {
        let client = test_client("http://127.0.0.1:9", 0);
        let result = client
            .process_document(b"", "empty.pdf", &ProcessingParams::default())
            .await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        // nothing listens on the discard port
        let client = test_client("http://127.0.0.1:9", 1);
        let error = client
            .process_document(b"hello", "notes.txt", &ProcessingParams::default())
            .await
            .unwrap_err();

        let cause = error.classified().unwrap();
        assert_eq!(cause.kind, ErrorKind::NetworkError);
        assert!(matches!(error, Error::Request { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_process_file_reads_from_disk() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PARTITION_PATH)
            .match_body(Matcher::Regex(r#"filename="memo.md""#.to_string()))
            .with_status(200)
            .with_body(r#"[{"type": "Title", "element_id": "x", "text": "Memo"}]"#)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.md");
        std::fs::write(&path, "# Memo\n").unwrap();

        let client = test_client(&server.url(), 0);
        let elements = client
            .process_file(&path, &ProcessingParams::default())
            .await
            .unwrap();
        assert_eq!(elements[0].text, "Memo");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_health_check() {
        let mut server = Server::new_async().await;
        let healthy = server
            .mock("GET", "/healthcheck")
            .with_status(200)
            .with_body(r#"{"healthcheck": "HEALTHCHECK STATUS: EVERYTHING OK!"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url(), 3);
        client.health_check().await.unwrap();
        healthy.assert_async().await;
    }

    #[tokio::test]
    async fn test_health_check_failure_is_single_attempt() {
        let mut server = Server::new_async().await;
        let unhealthy = server
            .mock("GET", "/healthcheck")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url(), 3);
        let error = client.health_check().await.unwrap_err();
        assert_eq!(error.classified().unwrap().kind, ErrorKind::ServerError);
        unhealthy.assert_async().await;
    }
}
