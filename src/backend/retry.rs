//! Bounded retry around any [`ComputeBackend`].
//!
//! Only errors that report [`ErrorCode::retryable`] are retried. Delay grows
//! linearly with the attempt number plus a random jitter of up to half the
//! base, so views that failed together do not retry in lockstep.

#[cfg(test)]
#[path = "retry_test.rs"]
mod retry_test;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use super::{BackendError, ClusterResult, ComputeBackend, Decomposition, DecompositionRequest, EntityData, ProjectionData};
use crate::cluster::ClusterParams;
use crate::error::ErrorCode;
use crate::model::{FeatureKey, FeatureMetadata};

/// Attempt budget and linear backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; `0` is treated as `1`.
    pub attempts: usize,
    pub base_ms: u64,
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub const NONE: RetryPolicy = RetryPolicy { attempts: 1, base_ms: 0 };

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        let linear = (attempt as u64).saturating_mul(self.base_ms);
        let jitter = if self.base_ms >= 2 { rand::rng().random_range(0..=self.base_ms / 2) } else { 0 };
        Duration::from_millis(linear.saturating_add(jitter))
    }
}

pub struct RetryingBackend<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: ComputeBackend> RetryingBackend<B> {
    #[must_use]
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    #[must_use]
    pub fn inner(&self) -> &B {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T, BackendError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, BackendError>> + Send,
        T: Send,
    {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.retryable() && attempt < attempts => {
                    warn!(op, error = %e, code = e.error_code(), attempt, total = attempts, "backend call failed; retrying");
                    tokio::time::sleep(self.policy.delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(op, error = %e, code = e.error_code(), attempt, "backend call failed");
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl<B: ComputeBackend> ComputeBackend for RetryingBackend<B> {
    async fn entity_data(&self, dataset: &str, features: &[FeatureKey]) -> Result<EntityData, BackendError> {
        self.with_retry("entity_data", || self.inner.entity_data(dataset, features)).await
    }

    async fn projection(&self, params: ClusterParams) -> Result<ProjectionData, BackendError> {
        self.with_retry("projection", || self.inner.projection(params)).await
    }

    async fn recompute_clusters(&self, params: ClusterParams, force: bool) -> Result<ClusterResult, BackendError> {
        self.with_retry("recompute_clusters", || self.inner.recompute_clusters(params, force)).await
    }

    async fn decomposition(&self, request: &DecompositionRequest) -> Result<Decomposition, BackendError> {
        self.with_retry("decomposition", || self.inner.decomposition(request)).await
    }

    async fn feature_metadata(&self) -> Result<Vec<FeatureMetadata>, BackendError> {
        self.with_retry("feature_metadata", || self.inner.feature_metadata()).await
    }
}
