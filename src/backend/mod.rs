//! Compute backend — the numerical service behind every view.
//!
//! DESIGN
//! ======
//! The backend does the heavy lifting (embedding, clustering, decomposition);
//! this crate only asks and folds answers in. [`ComputeBackend`] is the seam:
//! [`http::HttpBackend`] talks to the live service, [`retry::RetryingBackend`]
//! wraps any backend with bounded retry, and tests substitute a scripted mock.
//!
//! ERROR HANDLING
//! ==============
//! Every operation returns [`BackendError`]. Transport failures and 429/5xx
//! statuses are retryable; everything else (4xx, unparseable bodies, bad
//! URLs) is not.

pub mod http;
pub mod retry;
pub mod wire;

use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::{ClusterMap, ClusterParams};
use crate::error::ErrorCode;
use crate::model::{BaselineRecord, EntityId, FeatureContributions, FeatureKey, FeatureMetadata, ProjectedPoint, Region};
use crate::telemetry::TelemetryTable;
use crate::zscore::ZScoreTable;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by compute backend calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The request never got a response.
    #[error("backend request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("backend response parse failed: {0}")]
    Parse(String),

    /// A request URL could not be built from the configured base.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ErrorCode for BackendError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_BACKEND_TRANSPORT",
            Self::Status { .. } => "E_BACKEND_STATUS",
            Self::Parse(_) => "E_BACKEND_PARSE",
            Self::InvalidUrl(_) => "E_INVALID_URL",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// RESPONSES
// =============================================================================

/// Raw telemetry rows for the requested feature columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityData {
    pub table: TelemetryTable,
}

/// Embedding coordinates and per-cluster feature weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionData {
    pub points: Vec<ProjectedPoint>,
    pub contributions: FeatureContributions,
}

impl ProjectionData {
    /// Cluster labels carried on the projected points.
    #[must_use]
    pub fn cluster_map(&self) -> ClusterMap {
        self.points
            .iter()
            .filter_map(|p| p.cluster.map(|c| (p.entity_id.clone(), c)))
            .collect()
    }
}

/// A completed recluster: every piece is replaced together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterResult {
    pub assignments: ClusterMap,
    pub points: Vec<ProjectedPoint>,
    pub contributions: FeatureContributions,
}

/// Parameters of one decomposition call.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionRequest {
    pub entities: Vec<EntityId>,
    pub features: Vec<FeatureKey>,
    /// Recompute the decomposition rather than reading cached scores.
    pub recompute: bool,
    /// Baseline to score against; `None` uses the backend's stored one.
    pub baseline_edit: Option<Region>,
}

/// Z-scores plus the baselines they were computed against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decomposition {
    pub zscores: ZScoreTable,
    pub baselines: Vec<BaselineRecord>,
}

// =============================================================================
// TRAIT
// =============================================================================

/// Request/response interface of the compute backend.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    async fn entity_data(&self, dataset: &str, features: &[FeatureKey]) -> Result<EntityData, BackendError>;

    async fn projection(&self, params: ClusterParams) -> Result<ProjectionData, BackendError>;

    async fn recompute_clusters(&self, params: ClusterParams, force: bool) -> Result<ClusterResult, BackendError>;

    async fn decomposition(&self, request: &DecompositionRequest) -> Result<Decomposition, BackendError>;

    async fn feature_metadata(&self) -> Result<Vec<FeatureMetadata>, BackendError>;
}

#[async_trait]
impl<T: ComputeBackend + ?Sized> ComputeBackend for Arc<T> {
    async fn entity_data(&self, dataset: &str, features: &[FeatureKey]) -> Result<EntityData, BackendError> {
        (**self).entity_data(dataset, features).await
    }

    async fn projection(&self, params: ClusterParams) -> Result<ProjectionData, BackendError> {
        (**self).projection(params).await
    }

    async fn recompute_clusters(&self, params: ClusterParams, force: bool) -> Result<ClusterResult, BackendError> {
        (**self).recompute_clusters(params, force).await
    }

    async fn decomposition(&self, request: &DecompositionRequest) -> Result<Decomposition, BackendError> {
        (**self).decomposition(request).await
    }

    async fn feature_metadata(&self) -> Result<Vec<FeatureMetadata>, BackendError> {
        (**self).feature_metadata().await
    }
}
