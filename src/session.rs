//! Session — the coordinator behind a lock, wired to a compute backend.
//!
//! DESIGN
//! ======
//! Each operation takes the write lock only long enough to mutate state and
//! collect tickets, releases it, awaits the backend, then takes it again to
//! apply. The lock is never held across an `.await` on the backend, so a
//! slow decomposition cannot stall views reading snapshots.
//!
//! ERROR HANDLING
//! ==============
//! Backend failures and malformed answers are recorded on the coordinator
//! (views show them from the snapshot) and returned. Answers that lost a race
//! to a newer request are expected: they are logged at debug and reported as
//! success.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::Arc;

use gesture::brush::PixelRect;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, ComputeBackend};
use crate::baseline::{BaselineEdit, BrushPlacement, ChartScales};
use crate::cluster::ClusterRequest;
use crate::config::DatasetPreset;
use crate::coordinator::{
    Coordinator, DatasetTag, DecompositionTicket, EntityDataTicket, LoadPlan, Operation, ProjectionTicket,
    ToggleOutcome,
};
use crate::error::ErrorCode;
use crate::merge::MergeError;
use crate::model::{EntityId, FeatureKey, TimeRange};
use crate::selection::{EntitySelectionChange, FeatureToggle};
use crate::snapshot::Snapshot;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Backend(e) => e.error_code(),
            Self::Merge(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Backend(e) => e.retryable(),
            Self::Merge(e) => e.retryable(),
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Shared handle to one dashboard's state. Clones share everything.
#[derive(Clone)]
pub struct Session {
    coord: Arc<RwLock<Coordinator>>,
    backend: Arc<dyn ComputeBackend>,
}

impl Session {
    #[must_use]
    pub fn new(preset: DatasetPreset, backend: Arc<dyn ComputeBackend>) -> Self {
        Self { coord: Arc::new(RwLock::new(Coordinator::new(preset))), backend }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.coord.read().await.snapshot()
    }

    /// Load the starting dataset: metadata, telemetry, projection, and scores
    /// for the preset selection, fetched concurrently.
    ///
    /// # Errors
    ///
    /// The first failure among the fetches; the others still apply.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        let plan = self.coord.write().await.load_plan();
        info!(dataset = %plan.dataset.name, "loading dataset");
        self.run_plan(plan).await
    }

    /// Drop everything and load `preset`'s dataset.
    ///
    /// # Errors
    ///
    /// As for [`Self::initialize`].
    pub async fn switch_dataset(&self, preset: DatasetPreset) -> Result<(), SessionError> {
        let plan = self.coord.write().await.switch_dataset(preset);
        self.run_plan(plan).await
    }

    /// Replace the entity selection and rescore it.
    ///
    /// # Errors
    ///
    /// Returns the decomposition failure, if one was requested and failed.
    pub async fn select_entities(
        &self,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> Result<EntitySelectionChange, SessionError> {
        let outcome = self.coord.write().await.select_entities(ids);
        if let Some(ticket) = outcome.ticket {
            self.fetch_decomposition(ticket).await?;
        }
        Ok(outcome.change)
    }

    /// Toggle a feature; enabling fetches its scores and raw column.
    ///
    /// Returns `None` when the key is not part of the loaded dataset.
    ///
    /// # Errors
    ///
    /// The first failure among the fetches.
    pub async fn toggle_feature(&self, key: FeatureKey) -> Result<Option<FeatureToggle>, SessionError> {
        let outcome = self.coord.write().await.toggle_feature(key);
        match outcome {
            ToggleOutcome::Unknown => Ok(None),
            ToggleOutcome::Disabled { .. } => Ok(Some(FeatureToggle::Disabled)),
            ToggleOutcome::Enabled { decomposition, entity_data } => {
                let scores = async move {
                    match decomposition {
                        Some(ticket) => self.fetch_decomposition(ticket).await,
                        None => Ok(()),
                    }
                };
                let column = async move {
                    match entity_data {
                        Some(ticket) => self.fetch_entity_data(ticket).await,
                        None => Ok(()),
                    }
                };
                let (scores, column) = tokio::join!(scores, column);
                scores.and(column)?;
                Ok(Some(FeatureToggle::Enabled))
            }
        }
    }

    /// Where `feature`'s brush goes on a chart with `scales`.
    pub async fn place_baseline(&self, feature: &FeatureKey, scales: &ChartScales) -> BrushPlacement {
        self.coord.write().await.place_baseline(feature, scales)
    }

    pub async fn detach_baseline(&self, feature: &FeatureKey) {
        self.coord.write().await.detach_baseline(feature);
    }

    /// Commit a brush gesture and rescore `feature` against the edited
    /// baseline. Returns `None` when the gesture changed nothing.
    ///
    /// # Errors
    ///
    /// Returns the rescoring failure; the edit itself is kept.
    pub async fn commit_baseline_brush(
        &self,
        feature: &FeatureKey,
        selection: PixelRect,
        scales: &ChartScales,
    ) -> Result<Option<BaselineEdit>, SessionError> {
        let committed = self.coord.write().await.commit_baseline_brush(feature, selection, scales);
        let Some((edit, ticket)) = committed else {
            return Ok(None);
        };
        if let Some(ticket) = ticket {
            self.fetch_decomposition(ticket).await?;
        }
        Ok(Some(edit))
    }

    /// Recluster with `request`'s parameters.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; previous assignments stay in place.
    pub async fn recompute_clusters(&self, request: ClusterRequest) -> Result<(), SessionError> {
        let ticket = self.coord.write().await.cluster_request(request);
        self.fetch_clusters(ticket).await
    }

    /// Re-read the projection with the current parameters.
    ///
    /// # Errors
    ///
    /// Returns the backend failure.
    pub async fn refresh_projection(&self) -> Result<(), SessionError> {
        let ticket = self.coord.write().await.projection_request();
        self.fetch_projection(ticket).await
    }

    /// Refresh the feature catalog.
    ///
    /// # Errors
    ///
    /// Returns the backend failure.
    pub async fn load_feature_metadata(&self) -> Result<(), SessionError> {
        let dataset = self.coord.read().await.dataset_tag();
        self.fetch_metadata(dataset).await
    }

    pub async fn set_hovered_entity(&self, id: Option<EntityId>) -> bool {
        self.coord.write().await.set_hovered_entity(id)
    }

    pub async fn set_time_range(&self, range: Option<TimeRange>) {
        self.coord.write().await.set_time_range(range);
    }

    pub async fn clear_error(&self) {
        self.coord.write().await.clear_error();
    }

    // -------------------------------------------------------------------------
    // fetch + apply
    // -------------------------------------------------------------------------

    async fn run_plan(&self, plan: LoadPlan) -> Result<(), SessionError> {
        let LoadPlan { dataset, entity_data, projection, decomposition } = plan;
        let scores = async move {
            match decomposition {
                Some(ticket) => self.fetch_decomposition(ticket).await,
                None => Ok(()),
            }
        };
        let (metadata, rows, projection, scores) = tokio::join!(
            self.fetch_metadata(dataset),
            self.fetch_entity_data(entity_data),
            self.fetch_projection(projection),
            scores,
        );
        metadata.and(rows).and(projection).and(scores)
    }

    async fn fetch_decomposition(&self, ticket: DecompositionTicket) -> Result<(), SessionError> {
        debug!(request_id = %ticket.request_id, scope = %ticket.stamp.scope, "fetching decomposition");
        let response = self.backend.decomposition(&ticket.request).await;
        let mut coord = self.coord.write().await;
        match response {
            Ok(response) => {
                let applied = coord.apply_decomposition(&ticket, response).map(|_| ());
                settle(&mut coord, Operation::Decomposition, ticket.request_id, applied)
            }
            Err(e) => fail(&mut coord, Operation::Decomposition, ticket.request_id, e),
        }
    }

    async fn fetch_entity_data(&self, ticket: EntityDataTicket) -> Result<(), SessionError> {
        debug!(request_id = %ticket.request_id, features = ticket.features.len(), "fetching telemetry");
        let response = self.backend.entity_data(&ticket.dataset.name, &ticket.features).await;
        let mut coord = self.coord.write().await;
        match response {
            Ok(response) => {
                let applied = coord.apply_entity_data(&ticket, response).map(|_| ());
                settle(&mut coord, Operation::EntityData, ticket.request_id, applied)
            }
            Err(e) => fail(&mut coord, Operation::EntityData, ticket.request_id, e),
        }
    }

    async fn fetch_projection(&self, ticket: ProjectionTicket) -> Result<(), SessionError> {
        debug!(request_id = %ticket.request_id, "fetching projection");
        let response = self.backend.projection(ticket.params).await;
        let mut coord = self.coord.write().await;
        match response {
            Ok(response) => {
                let applied = coord.apply_projection(&ticket, response);
                settle(&mut coord, Operation::Projection, ticket.request_id, applied)
            }
            Err(e) => fail(&mut coord, Operation::Projection, ticket.request_id, e),
        }
    }

    async fn fetch_clusters(&self, ticket: ProjectionTicket) -> Result<(), SessionError> {
        debug!(request_id = %ticket.request_id, force = ticket.force, "recomputing clusters");
        let response = self.backend.recompute_clusters(ticket.params, ticket.force).await;
        let mut coord = self.coord.write().await;
        match response {
            Ok(response) => {
                let applied = coord.apply_cluster_result(&ticket, response);
                settle(&mut coord, Operation::Clusters, ticket.request_id, applied)
            }
            Err(e) => fail(&mut coord, Operation::Clusters, ticket.request_id, e),
        }
    }

    async fn fetch_metadata(&self, dataset: DatasetTag) -> Result<(), SessionError> {
        let request_id = Uuid::new_v4();
        debug!(%request_id, "fetching feature metadata");
        let response = self.backend.feature_metadata().await;
        let mut coord = self.coord.write().await;
        match response {
            Ok(metadata) => {
                let applied = coord.apply_feature_metadata(&dataset, metadata).map(|_| ());
                settle(&mut coord, Operation::FeatureMetadata, request_id, applied)
            }
            Err(e) => fail(&mut coord, Operation::FeatureMetadata, request_id, e),
        }
    }
}

/// Superseded answers are fine; anything else is surfaced.
fn settle(
    coord: &mut Coordinator,
    op: Operation,
    request_id: Uuid,
    applied: Result<(), MergeError>,
) -> Result<(), SessionError> {
    match applied {
        Ok(()) => Ok(()),
        Err(e @ (MergeError::StaleResponse { .. } | MergeError::DatasetMismatch { .. })) => {
            debug!(%request_id, %op, reason = %e, "discarding superseded response");
            Ok(())
        }
        Err(e) => {
            warn!(%request_id, %op, error = %e, code = e.error_code(), "response rejected");
            coord.record_failure(op, &e);
            Err(e.into())
        }
    }
}

fn fail(coord: &mut Coordinator, op: Operation, request_id: Uuid, e: BackendError) -> Result<(), SessionError> {
    warn!(%request_id, %op, error = %e, code = e.error_code(), "backend request failed");
    coord.record_failure(op, &e);
    Err(e.into())
}
