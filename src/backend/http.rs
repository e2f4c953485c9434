//! HTTP client for the compute backend.
//!
//! Thin reqwest wrapper: builds the path-parameter URLs the service expects,
//! checks the status, and hands the body to the pure parsers in
//! [`super::wire`]. List parameters are comma-joined into one segment;
//! boolean flags travel as `0`/`1`.

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, warn};

use super::wire;
use super::{BackendError, ClusterResult, ComputeBackend, Decomposition, DecompositionRequest, EntityData, ProjectionData};
use crate::cluster::ClusterParams;
use crate::config::BackendTimeouts;
use crate::model::{FeatureKey, FeatureMetadata};

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidUrl`] if `base_url` cannot carry path
    /// segments, or [`BackendError::HttpClientBuild`] if the client fails.
    pub fn new(base_url: &str, timeouts: BackendTimeouts) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url).map_err(|e| BackendError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended, each percent-encoded as one segment.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidUrl`] if the base cannot carry a path.
    pub fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| BackendError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment.as_ref());
            }
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<String, BackendError> {
        let started = Instant::now();
        debug!(%url, "backend request");

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let elapsed_ms = started.elapsed().as_millis();
        if status != 200 {
            warn!(path = url.path(), status, elapsed_ms, "backend returned error status");
            return Err(BackendError::Status { status, body: text });
        }
        debug!(path = url.path(), status, elapsed_ms, bytes = text.len(), "backend response");
        Ok(text)
    }
}

// =============================================================================
// PATHS
// =============================================================================

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

fn flag(on: bool) -> &'static str {
    if on { "1" } else { "0" }
}

pub(crate) fn entity_data_segments(dataset: &str, features: &[FeatureKey]) -> Vec<String> {
    vec!["entityData".into(), dataset.into(), join(features)]
}

pub(crate) fn projection_segments(params: ClusterParams) -> Vec<String> {
    vec![
        "drTimeData".into(),
        params.n_neighbors.to_string(),
        params.min_dist.to_string(),
        params.num_clusters.to_string(),
    ]
}

pub(crate) fn recompute_segments(params: ClusterParams, force: bool) -> Vec<String> {
    vec![
        "recomputeClusters".into(),
        params.num_clusters.to_string(),
        params.n_neighbors.to_string(),
        params.min_dist.to_string(),
        flag(force).into(),
    ]
}

/// `/mrdmd/{ids}/{features}/{recompute}/{edit}/{vMin}/{vMax}/{bStart}/{bEnd}`.
/// Without an edit the four baseline segments are `0`.
pub(crate) fn decomposition_segments(request: &DecompositionRequest) -> Result<Vec<String>, BackendError> {
    let mut segments = vec![
        "mrdmd".into(),
        join(&request.entities),
        join(&request.features),
        flag(request.recompute).into(),
        flag(request.baseline_edit.is_some()).into(),
    ];
    match request.baseline_edit {
        Some(region) => {
            segments.push(region.value.min.to_string());
            segments.push(region.value.max.to_string());
            segments.push(wire::format_http_time(region.time.start)?);
            segments.push(wire::format_http_time(region.time.end)?);
        }
        None => segments.extend(std::iter::repeat_n("0".to_string(), 4)),
    }
    Ok(segments)
}

// =============================================================================
// TRAIT IMPL
// =============================================================================

#[async_trait]
impl ComputeBackend for HttpBackend {
    async fn entity_data(&self, dataset: &str, features: &[FeatureKey]) -> Result<EntityData, BackendError> {
        let text = self.get(self.endpoint(&entity_data_segments(dataset, features))?).await?;
        wire::parse_entity_data(&text)
    }

    async fn projection(&self, params: ClusterParams) -> Result<ProjectionData, BackendError> {
        let text = self.get(self.endpoint(&projection_segments(params))?).await?;
        wire::parse_projection(&text)
    }

    async fn recompute_clusters(&self, params: ClusterParams, force: bool) -> Result<ClusterResult, BackendError> {
        let text = self.get(self.endpoint(&recompute_segments(params, force))?).await?;
        wire::parse_cluster_result(&text)
    }

    async fn decomposition(&self, request: &DecompositionRequest) -> Result<Decomposition, BackendError> {
        let text = self.get(self.endpoint(&decomposition_segments(request)?)?).await?;
        wire::parse_decomposition(&text)
    }

    async fn feature_metadata(&self) -> Result<Vec<FeatureMetadata>, BackendError> {
        let text = self.get(self.endpoint(&["featureMetadata"])?).await?;
        wire::parse_feature_metadata(&text)
    }
}
