//! Outbound request gate
//!
//! Wraps a `governor` token bucket with a FIFO semaphore so that at most
//! `max_concurrent` requests are in flight and at most `requests_per_minute`
//! start in any minute.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::Semaphore;
use tracing::{debug_span, Instrument};

use crate::error::{Error, Result};

/// Token bucket plus concurrency gate, shared by clones
#[derive(Clone)]
pub struct RequestLimiter {
    limiter: Arc<DefaultDirectRateLimiter>,
    in_flight: Arc<Semaphore>,
    requests_per_minute: u32,
}

impl std::fmt::Debug for RequestLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLimiter")
            .field("requests_per_minute", &self.requests_per_minute)
            .field("available_slots", &self.in_flight.available_permits())
            .finish()
    }
}

impl RequestLimiter {
    /// Create a limiter allowing `requests_per_minute` starts per minute with
    /// at most `max_concurrent` requests in flight
    pub fn new(requests_per_minute: u32, max_concurrent: usize) -> Result<Self> {
        let quota = NonZeroU32::new(requests_per_minute).ok_or_else(|| {
            Error::Config("requests_per_minute must be greater than zero".to_string())
        })?;
        if max_concurrent == 0 {
            return Err(Error::Config(
                "max_concurrent must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(quota))),
            in_flight: Arc::new(Semaphore::new(max_concurrent)),
            requests_per_minute,
        })
    }

    /// Configured quota per minute
    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Run `operation` once a concurrency slot and a rate token are available
    ///
    /// Waiters are served in arrival order. The slot is held until the
    /// operation completes.
    pub async fn run<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let _permit = self
            .in_flight
            .acquire()
            .instrument(debug_span!("limiter_slot"))
            .await
            .map_err(|e| Error::Config(format!("request limiter closed: {}", e)))?;

        self.limiter
            .until_ready()
            .instrument(debug_span!("limiter"))
            .await;

        Ok(operation.await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_rejects_zero_quota() {
        assert!(matches!(RequestLimiter::new(0, 1), Err(Error::Config(_))));
        assert!(matches!(RequestLimiter::new(10, 0), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_burst_up_to_quota_does_not_wait() {
        let limiter = RequestLimiter::new(5, 1).unwrap();

        let start = std::time::Instant::now();
        for i in 0..5 {
            let value = limiter.run(async move { i * 2 }).await.unwrap();
            assert_eq!(value, i * 2);
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_single_slot_serializes_operations() {
        let limiter = RequestLimiter::new(100, 1).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let limiter = limiter.clone();
            let active = active.clone();
            let peak = peak.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        order.lock().await.push(i);
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(*order.lock().await, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_exhausted_quota_blocks_next_start() {
        let limiter = RequestLimiter::new(1, 1).unwrap();

        assert_eq!(limiter.run(async { 1 }).await.unwrap(), 1);

        // The slot is free again, so only the per-minute quota can hold this back
        let blocked =
            tokio::time::timeout(Duration::from_millis(200), limiter.run(async { 2 })).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn test_wider_gate_allows_overlap() {
        let limiter = RequestLimiter::new(100, 3).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..3).map(|_| {
            let limiter = limiter.clone();
            let active = active.clone();
            let peak = peak.clone();
            async move {
                limiter
                    .run(async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }
        });
        futures::future::join_all(tasks).await;

        assert!(peak.load(Ordering::SeqCst) > 1);
    }
}
