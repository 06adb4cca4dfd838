use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rig::embeddings::{Embedding, EmbeddingError, EmbeddingModel};
use tracing::{debug_span, info_span, Instrument};

use crate::error::{Error, Result};

/// Gates every `embed_texts` call of the wrapped model behind a token bucket
#[derive(Clone)]
pub struct RateLimitedEmbeddingModel<M: EmbeddingModel> {
    model: M,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<M> RateLimitedEmbeddingModel<M>
where
    M: EmbeddingModel,
{
    pub fn new(model: M, limiter: DefaultDirectRateLimiter) -> Self {
        Self::shared(model, Arc::new(limiter))
    }

    /// Wrap `model` behind a limiter other models may also draw from
    pub fn shared(model: M, limiter: Arc<DefaultDirectRateLimiter>) -> Self {
        Self { model, limiter }
    }

    /// Wrap `model` with a fresh quota of `requests_per_minute`
    pub fn per_minute(model: M, requests_per_minute: u32) -> Result<Self> {
        let quota = NonZeroU32::new(requests_per_minute).ok_or_else(|| {
            Error::Config("requests_per_minute must be greater than zero".to_string())
        })?;
        Ok(Self::new(model, RateLimiter::direct(Quota::per_minute(quota))))
    }

    pub fn inner(&self) -> &M {
        &self.model
    }

    pub fn limiter(&self) -> Arc<DefaultDirectRateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Wait for one token, for callers that drive the inner model directly
    pub async fn ready(&self) {
        self.limiter.until_ready().instrument(debug_span!("limiter")).await;
    }
}

impl<M: EmbeddingModel> EmbeddingModel for RateLimitedEmbeddingModel<M> {
    const MAX_DOCUMENTS: usize = M::MAX_DOCUMENTS;

    fn ndims(&self) -> usize {
        self.model.ndims()
    }

    async fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> std::result::Result<Vec<Embedding>, EmbeddingError> {
        self.ready().await;
        self.model.embed_texts(texts).instrument(info_span!("embed_texts")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct CountingModel {
        calls: Arc<AtomicUsize>,
    }

    impl EmbeddingModel for CountingModel {
        const MAX_DOCUMENTS: usize = 8;

        fn ndims(&self) -> usize {
            3
        }

        async fn embed_texts(
            &self,
            texts: impl IntoIterator<Item = String> + Send,
        ) -> std::result::Result<Vec<Embedding>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .into_iter()
                .map(|document| Embedding {
                    document,
                    vec: vec![0.0; 3],
                })
                .collect())
        }
    }

    #[test]
    fn test_rejects_zero_quota() {
        assert!(RateLimitedEmbeddingModel::per_minute(CountingModel::default(), 0).is_err());
    }

    #[tokio::test]
    async fn test_delegates_within_quota() {
        let model = CountingModel::default();
        let limited = RateLimitedEmbeddingModel::per_minute(model.clone(), 60).unwrap();

        assert_eq!(limited.ndims(), 3);
        assert_eq!(RateLimitedEmbeddingModel::<CountingModel>::MAX_DOCUMENTS, 8);

        for _ in 0..3 {
            let embeddings = limited
                .embed_texts(vec!["a".to_string(), "b".to_string()])
                .await
                .unwrap();
            assert_eq!(embeddings.len(), 2);
        }
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shared_limiter_is_drawn_down_by_both_models() {
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(
            NonZeroU32::new(2).unwrap(),
        )));
        let first = RateLimitedEmbeddingModel::shared(CountingModel::default(), limiter.clone());
        let second = RateLimitedEmbeddingModel::shared(CountingModel::default(), limiter.clone());

        first.embed_texts(vec!["a".to_string()]).await.unwrap();
        second.embed_texts(vec!["b".to_string()]).await.unwrap();

        // both burst tokens are spent
        assert!(limiter.check().is_err());
    }
}
