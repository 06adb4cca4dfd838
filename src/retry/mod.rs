//! # Retry Module
//!
//! Bounded retries with backoff for outbound vendor requests.
//!
//! ## Key Components
//!
//! - `RetryPolicy`: retry budget and backoff parameters
//! - `retry_with_backoff`: drives an operation until it succeeds, fails with a
//!   non-retryable error, or runs out of attempts
//! - `ClassifiedError`: the tagged failure every attempt is reduced to
//! - `RequestLimiter`: token bucket and concurrency gate wrapping each attempt
//! - `send_json`: one HTTP attempt reduced to a JSON body or a `ClassifiedError`
//!
//! A server supplied `Retry-After` is honored exactly. Without one the delay
//! grows exponentially from `base_delay` and is capped at `max_delay`.

mod classify;
mod limiter;

pub use classify::{ClassifiedError, ErrorKind};
pub(crate) use classify::retry_after_from_headers;
pub use limiter::RequestLimiter;

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first retry when the server gives no hint
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on computed backoff delays
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Retry budget and backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// Delay after the first failed attempt
    pub base_delay: Duration,

    /// Ceiling for computed delays
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy with the default backoff and the given retry budget
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Total attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32, error: &ClassifiedError) -> Duration {
        match error.retry_after {
            Some(hint) => hint,
            None => self.backoff(attempt),
        }
    }

    /// Exponential delay for `attempt` (1-based): `base * 2^(attempt - 1)`,
    /// capped at `max_delay`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Run `operation` until it succeeds or the policy gives up
///
/// The closure receives the 1-based attempt number. Failures that are not
/// retryable end the loop immediately; otherwise the loop sleeps for
/// [`RetryPolicy::delay_for`] and tries again, for at most
/// `max_retries + 1` attempts. The returned error names `name` and wraps the
/// last classified failure.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, ClassifiedError>>,
{
    let started = Instant::now();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", name, attempt);
                }
                return Ok(value);
            }
            Err(error) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts(),
                    elapsed_ms,
                    kind = %error.kind,
                    retryable = error.retryable,
                    "{} attempt failed: {}",
                    name,
                    error.message
                );

                if !error.retryable || attempt >= policy.max_attempts() {
                    return Err(Error::Request {
                        operation: name.to_string(),
                        attempts: attempt,
                        cause: error,
                    });
                }

                let delay = policy.delay_for(attempt, &error);
                debug!(
                    "Retrying {} in {} ms (attempt {}/{})",
                    name,
                    delay.as_millis(),
                    attempt + 1,
                    policy.max_attempts()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Send one request and decode its JSON body
///
/// Transport failures, non-success statuses and undecodable bodies all come
/// back as a [`ClassifiedError`] ready for [`retry_with_backoff`].
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    name: &str,
) -> std::result::Result<Value, ClassifiedError> {
    let response = request
        .send()
        .await
        .map_err(|e| ClassifiedError::from_reqwest(&e))?;

    let status = response.status();
    let retry_after = retry_after_from_headers(response.headers());
    let body = response
        .text()
        .await
        .map_err(|e| ClassifiedError::from_reqwest(&e))?;

    if !status.is_success() {
        error!("{} API error: {} - {}", name, status, body);
        return Err(ClassifiedError::from_status(status, &body, retry_after));
    }

    serde_json::from_str(&body).map_err(|e| {
        error!("Failed to parse {} response: {}", name, e);
        ClassifiedError::new(
            ErrorKind::Unknown,
            format!("{} returned invalid JSON: {}", name, e),
        )
    })
}
