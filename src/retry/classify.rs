//! Failure classification for outbound requests
//!
//! Every failed attempt is reduced to a [`ClassifiedError`] before the retry
//! loop decides what to do with it. Classification prefers structured data
//! (HTTP status, transport error flags); [`ClassifiedError::from_message`] is
//! the fallback for failures that only carry a message.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Longest slice of a raw response body carried into an error message
const MAX_BODY_IN_MESSAGE: usize = 200;

/// Ceiling applied to server supplied `Retry-After` hints
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials missing or rejected
    AuthenticationError,
    /// The service refused the payload size
    FileTooLarge,
    /// The service could not process the payload
    InvalidFormat,
    /// Throttled by the service
    QuotaExceeded,
    /// The service failed internally
    ServerError,
    /// The request did not complete in time
    Timeout,
    /// The service could not be reached
    NetworkError,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    /// Stable tag used in logs and serialized output
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthenticationError => "authentication_error",
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::InvalidFormat => "invalid_format",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Whether another attempt can change the outcome
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::QuotaExceeded
                | ErrorKind::ServerError
                | ErrorKind::Timeout
                | ErrorKind::NetworkError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed attempt, tagged with what went wrong and whether to try again
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    /// What kind of failure this was
    pub kind: ErrorKind,

    /// Human readable description
    pub message: String,

    /// Vendor specific error code, when the response body carried one
    pub code: Option<String>,

    /// HTTP status, when the failure was an HTTP response
    pub status: Option<u16>,

    /// Whether the retry loop may try again
    pub retryable: bool,

    /// Server supplied delay before the next attempt
    pub retry_after: Option<Duration>,

    /// When the failure was observed
    pub timestamp: DateTime<Utc>,

    /// Decoded vendor error body
    pub details: Option<Value>,
}

impl ClassifiedError {
    /// Create an error of the given kind using the default retry policy for it
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            status: None,
            retryable: kind.is_retryable(),
            retry_after: None,
            timestamp: Utc::now(),
            details: None,
        }
    }

    /// Attach a server supplied retry delay
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Classify a non-success HTTP response
    ///
    /// `body` is the raw response text; when it decodes as a vendor error
    /// object its message and code are lifted into the result.
    pub fn from_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> Self {
        let kind = match status.as_u16() {
            401 | 403 => ErrorKind::AuthenticationError,
            413 => ErrorKind::FileTooLarge,
            415 | 422 => ErrorKind::InvalidFormat,
            429 => ErrorKind::QuotaExceeded,
            _ if status.is_server_error() => ErrorKind::ServerError,
            _ => ErrorKind::Unknown,
        };

        let details = serde_json::from_str::<Value>(body).ok();
        let vendor_message = details.as_ref().and_then(vendor_message);
        let code = details.as_ref().and_then(vendor_code);

        let detail_text = match vendor_message {
            Some(message) => message,
            None if body.trim().is_empty() => status
                .canonical_reason()
                .unwrap_or("no response body")
                .to_string(),
            None => truncate(body.trim(), MAX_BODY_IN_MESSAGE),
        };

        let mut error = Self::new(kind, format!("HTTP {}: {}", status.as_u16(), detail_text));
        error.status = Some(status.as_u16());
        error.code = code;
        error.details = details;
        // only throttling responses carry a meaningful Retry-After
        if kind == ErrorKind::QuotaExceeded {
            error.retry_after = retry_after;
        }
        error
    }

    /// Classify a transport level failure from the HTTP client
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorKind::Timeout, format!("request timed out: {}", err))
        } else if err.is_connect() {
            Self::new(ErrorKind::NetworkError, format!("connection failed: {}", err))
        } else if let Some(status) = err.status() {
            Self::from_status(status, "", None)
        } else {
            Self::from_message(err.to_string())
        }
    }

    /// Classify an opaque failure by inspecting its message
    ///
    /// Checks run in a fixed precedence order so that a message mentioning
    /// several codes is classified by the most specific one.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        let kind = if message.contains("401") {
            ErrorKind::AuthenticationError
        } else if message.contains("413") {
            ErrorKind::FileTooLarge
        } else if message.contains("422") {
            ErrorKind::InvalidFormat
        } else if message.contains("429") {
            ErrorKind::QuotaExceeded
        } else if ["500", "502", "503", "504"]
            .iter()
            .any(|code| message.contains(code))
        {
            ErrorKind::ServerError
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || message.contains("ETIMEDOUT")
        {
            ErrorKind::Timeout
        } else if message.contains("ECONNREFUSED")
            || message.contains("ENOTFOUND")
            || lower.contains("connection refused")
            || lower.contains("dns error")
        {
            ErrorKind::NetworkError
        } else {
            ErrorKind::Unknown
        };

        // digits in a transport message are usually addresses or ports
        let status = match kind {
            ErrorKind::Timeout | ErrorKind::NetworkError => None,
            _ => extract_status(&message),
        };
        let mut error = Self::new(kind, message);
        error.status = status;
        if kind == ErrorKind::Unknown {
            error.retryable = status.is_some_and(|s| s >= 500);
        }
        error
    }
}

/// Parse a `Retry-After` header given in whole or fractional seconds
///
/// The HTTP-date form is not supported and yields `None`. Hints longer than
/// [`MAX_RETRY_AFTER`] are clamped to it.
pub(crate) fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let seconds = value.parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds.min(MAX_RETRY_AFTER.as_secs_f64())).ok()
}

fn vendor_message(body: &Value) -> Option<String> {
    let candidate = body
        .get("detail")
        .or_else(|| body.get("error").and_then(|e| e.get("message")))
        .or_else(|| body.get("message"))
        .or_else(|| body.get("error"))?;

    match candidate {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn vendor_code(body: &Value) -> Option<String> {
    let candidate = body
        .get("error")
        .and_then(|e| e.get("code").or_else(|| e.get("type")))
        .or_else(|| body.get("code"))?;

    match candidate {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First standalone three digit number in the HTTP status range
fn extract_status(message: &str) -> Option<u16> {
    message
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 3)
        .filter_map(|run| run.parse::<u16>().ok())
        .find(|code| (100..=599).contains(code))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
