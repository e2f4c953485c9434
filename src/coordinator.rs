//! Coordinator — the single owned coordination state.
//!
//! DESIGN
//! ======
//! Every piece of shared dashboard state lives here and changes only through
//! these methods. Views read [`Snapshot`]s and call mutators; they never hold
//! a mutable reference.
//!
//! Mutators that need the backend do not call it. They update local state,
//! stamp a request with the [`RequestLedger`], and return a ticket. The
//! caller performs the I/O and hands the answer back to the matching
//! `apply_*` method, which re-checks the stamp before touching anything.
//! That split keeps this type synchronous and lets ordering races be tested
//! without a runtime.
//!
//! Large tables sit behind `Arc` and are changed with `Arc::make_mut`: a
//! snapshot taken before an apply keeps the old table, and the new one is
//! published in a single assignment, so no reader sees a half-merged table.
//!
//! STALENESS
//! =========
//! - Dataset: each ticket carries the dataset name and load generation it was
//!   issued under; answers for an unloaded dataset are rejected outright.
//! - Selection epoch: a new entity selection supersedes every selection- and
//!   feature-scoped request issued before it.
//! - Column generation: each requested feature column records the feature's
//!   generation at issue time. A toggle-off or a newer baseline edit bumps
//!   it, and the older answer's column is skipped rather than written.

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod coordinator_test;

use std::collections::BTreeMap;
use std::sync::Arc;

use gesture::brush::PixelRect;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{ClusterResult, Decomposition, DecompositionRequest, EntityData, ProjectionData};
use crate::baseline::{BaselineEdit, BaselineEditor, BrushPlacement, ChartScales};
use crate::cluster::{ClusterMap, ClusterParams, ClusterRequest};
use crate::config::DatasetPreset;
use crate::merge::{ColumnBatch, MergeError, RequestLedger, RequestScope, RequestStamp, merge_column, purge_column};
use crate::model::{
    EntityId, FeatureCatalog, FeatureContributions, FeatureKey, FeatureMetadata, ProjectedPoint, Region, TimeRange,
};
use crate::selection::{EntitySelectionChange, FeatureToggle, SelectionStore};
use crate::snapshot::Snapshot;
use crate::telemetry::TelemetryTable;
use crate::zscore::ZScoreTable;

// =============================================================================
// OPERATIONS
// =============================================================================

/// Backend round trips whose failures are surfaced to views.
///
/// Failures are kept per operation: a later success clears only its own
/// operation's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    FeatureMetadata,
    EntityData,
    Projection,
    Clusters,
    Decomposition,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FeatureMetadata => "feature metadata",
            Self::EntityData => "entity data",
            Self::Projection => "projection",
            Self::Clusters => "clusters",
            Self::Decomposition => "decomposition",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TICKETS
// =============================================================================

/// Which loaded dataset a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetTag {
    pub name: String,
    pub generation: u64,
}

/// A pending decomposition request.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionTicket {
    pub request_id: Uuid,
    pub dataset: DatasetTag,
    pub stamp: RequestStamp,
    pub request: DecompositionRequest,
    /// Generation of each requested feature column at issue time.
    pub columns: BTreeMap<FeatureKey, u64>,
}

/// A pending raw-telemetry request.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDataTicket {
    pub request_id: Uuid,
    pub dataset: DatasetTag,
    pub features: Vec<FeatureKey>,
}

/// A pending projection or recluster request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionTicket {
    pub request_id: Uuid,
    pub dataset: DatasetTag,
    pub stamp: RequestStamp,
    pub params: ClusterParams,
    pub force: bool,
}

/// Requests that bring a freshly selected dataset up.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPlan {
    pub dataset: DatasetTag,
    pub entity_data: EntityDataTicket,
    pub projection: ProjectionTicket,
    /// `None` while nothing is selected.
    pub decomposition: Option<DecompositionTicket>,
}

/// Result of replacing the entity selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOutcome {
    pub change: EntitySelectionChange,
    pub ticket: Option<DecompositionTicket>,
}

/// Result of toggling a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    /// The feature was removed and its scores purged.
    Disabled { purged: usize },
    /// The feature was added; fetch whatever tickets are present.
    Enabled {
        decomposition: Option<DecompositionTicket>,
        entity_data: Option<EntityDataTicket>,
    },
    /// The key is not part of the loaded dataset.
    Unknown,
}

/// What an applied decomposition changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Applied {
    pub columns: usize,
    pub cells: usize,
    pub baselines: usize,
}

// =============================================================================
// COORDINATOR
// =============================================================================

#[derive(Debug, Clone)]
pub struct Coordinator {
    dataset: DatasetTag,
    params: ClusterParams,
    selection: SelectionStore,
    telemetry: Arc<TelemetryTable>,
    zscores: Arc<ZScoreTable>,
    baselines: BaselineEditor,
    clusters: Arc<ClusterMap>,
    projection: Arc<Vec<ProjectedPoint>>,
    contributions: Arc<FeatureContributions>,
    catalog: FeatureCatalog,
    ledger: RequestLedger,
    errors: BTreeMap<Operation, String>,
}

impl Coordinator {
    #[must_use]
    pub fn new(preset: DatasetPreset) -> Self {
        Self {
            dataset: DatasetTag { name: preset.dataset.clone(), generation: 0 },
            params: preset.params,
            selection: SelectionStore::new(preset.selection_state()),
            telemetry: Arc::default(),
            zscores: Arc::default(),
            baselines: BaselineEditor::new(),
            clusters: Arc::default(),
            projection: Arc::default(),
            contributions: Arc::default(),
            catalog: FeatureCatalog::default(),
            ledger: RequestLedger::new(),
            errors: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset.name
    }

    #[must_use]
    pub fn dataset_tag(&self) -> DatasetTag {
        self.dataset.clone()
    }

    #[must_use]
    pub fn params(&self) -> ClusterParams {
        self.params
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionStore {
        &self.selection
    }

    #[must_use]
    pub fn zscores(&self) -> &ZScoreTable {
        &self.zscores
    }

    #[must_use]
    pub fn baselines(&self) -> &BaselineEditor {
        &self.baselines
    }

    /// Outstanding failures, one per operation, joined for display.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(self.errors.values().map(String::as_str).collect::<Vec<_>>().join("; "))
    }

    #[must_use]
    pub fn failure(&self, op: Operation) -> Option<&str> {
        self.errors.get(&op).map(String::as_str)
    }

    /// Cheap immutable view of the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            dataset: self.dataset.name.clone(),
            params: self.params,
            selection: self.selection.state().clone(),
            telemetry: Arc::clone(&self.telemetry),
            zscores: Arc::clone(&self.zscores),
            baselines: self.baselines.shared(),
            clusters: Arc::clone(&self.clusters),
            projection: Arc::clone(&self.projection),
            contributions: Arc::clone(&self.contributions),
            catalog: self.catalog.clone(),
            error: self.error(),
        }
    }

    // -------------------------------------------------------------------------
    // lifecycle
    // -------------------------------------------------------------------------

    /// Tickets for loading the current dataset from scratch.
    pub fn load_plan(&mut self) -> LoadPlan {
        let features = self.selection.state().selected_features.clone();
        let entity_data = self.entity_data_ticket(features);
        let projection = self.projection_ticket(self.params, false);
        let decomposition = self.selection_ticket();
        LoadPlan { dataset: self.dataset.clone(), entity_data, projection, decomposition }
    }

    /// Replace everything with `preset`'s defaults. In-flight answers for the
    /// previous dataset become stale.
    pub fn switch_dataset(&mut self, preset: DatasetPreset) -> LoadPlan {
        info!(from = %self.dataset.name, to = %preset.dataset, "switching dataset");
        self.dataset = DatasetTag { name: preset.dataset.clone(), generation: self.dataset.generation + 1 };
        self.params = preset.params;
        self.selection.reset(preset.selection_state());
        self.telemetry = Arc::default();
        self.zscores = Arc::default();
        self.baselines.clear();
        self.clusters = Arc::default();
        self.projection = Arc::default();
        self.contributions = Arc::default();
        self.catalog = FeatureCatalog::default();
        self.ledger.supersede_all();
        self.errors.clear();
        self.load_plan()
    }

    /// Record a failure of `op` for views to surface. State is otherwise
    /// untouched.
    pub fn record_failure(&mut self, op: Operation, error: &dyn std::fmt::Display) {
        self.errors.insert(op, format!("{op}: {error}"));
    }

    /// Dismiss every surfaced failure.
    pub fn clear_error(&mut self) {
        self.errors.clear();
    }

    // -------------------------------------------------------------------------
    // selection
    // -------------------------------------------------------------------------

    /// Replace the selected entities.
    ///
    /// A new non-empty set yields a selection-scoped decomposition ticket.
    /// An empty set clears the scores and supersedes anything in flight; an
    /// identical set does nothing.
    pub fn select_entities(&mut self, ids: impl IntoIterator<Item = EntityId>) -> SelectionOutcome {
        let change = self.selection.set_selected_entities(ids);
        let ticket = match change {
            EntitySelectionChange::Unchanged => None,
            EntitySelectionChange::Cleared => {
                self.ledger.advance_epoch();
                self.zscores = Arc::default();
                info!("entity selection cleared");
                None
            }
            EntitySelectionChange::Changed => {
                let ticket = self.selection_ticket();
                if ticket.is_none() {
                    // Nothing to score yet; still supersede older answers.
                    self.ledger.advance_epoch();
                }
                let count = self.selection.state().selected_entities.len();
                info!(count, "entity selection changed");
                ticket
            }
        };
        SelectionOutcome { change, ticket }
    }

    /// Toggle `key` in the feature list.
    pub fn toggle_feature(&mut self, key: FeatureKey) -> ToggleOutcome {
        let known = self.catalog.is_empty() || self.catalog.contains(&key) || self.telemetry.features().contains(&key);
        if !known && !self.selection.state().is_feature_selected(&key) {
            warn!(feature = %key, "toggle for unknown feature ignored");
            return ToggleOutcome::Unknown;
        }

        match self.selection.toggle_feature(key.clone()) {
            FeatureToggle::Disabled => {
                self.ledger.invalidate_feature(&key);
                let purged = purge_column(Arc::make_mut(&mut self.zscores), &key);
                self.baselines.detach(&key);
                info!(feature = %key, purged, "feature disabled");
                ToggleOutcome::Disabled { purged }
            }
            FeatureToggle::Enabled => {
                let decomposition = self.feature_ticket(&key, None);
                let entity_data = if self.telemetry.features().contains(&key) {
                    None
                } else {
                    Some(self.entity_data_ticket(vec![key.clone()]))
                };
                info!(feature = %key, fetch = decomposition.is_some(), "feature enabled");
                ToggleOutcome::Enabled { decomposition, entity_data }
            }
        }
    }

    pub fn set_hovered_entity(&mut self, id: Option<EntityId>) -> bool {
        self.selection.set_hovered_entity(id)
    }

    pub fn set_time_range(&mut self, range: Option<TimeRange>) {
        self.selection.set_time_range(range);
    }

    // -------------------------------------------------------------------------
    // baselines
    // -------------------------------------------------------------------------

    /// Where `feature`'s brush goes on a chart with `scales`.
    pub fn place_baseline(&mut self, feature: &FeatureKey, scales: &ChartScales) -> BrushPlacement {
        self.baselines.place(feature, scales)
    }

    /// The chart for `feature` was torn down.
    pub fn detach_baseline(&mut self, feature: &FeatureKey) {
        self.baselines.detach(feature);
    }

    /// Fold a brush-end gesture into `feature`'s baseline.
    ///
    /// Returns the edit and, when entities are selected, a feature-scoped
    /// ticket to rescore against the new region.
    pub fn commit_baseline_brush(
        &mut self,
        feature: &FeatureKey,
        selection: PixelRect,
        scales: &ChartScales,
    ) -> Option<(BaselineEdit, Option<DecompositionTicket>)> {
        let edit = self.baselines.commit_brush(feature, selection, scales)?;
        let ticket = self.feature_ticket(feature, Some(edit.region));
        Some((edit, ticket))
    }

    // -------------------------------------------------------------------------
    // clusters
    // -------------------------------------------------------------------------

    /// Ticket for a projection refresh with the current parameters.
    pub fn projection_request(&mut self) -> ProjectionTicket {
        self.projection_ticket(self.params, false)
    }

    /// Ticket for a debounced recluster.
    pub fn cluster_request(&mut self, request: ClusterRequest) -> ProjectionTicket {
        self.projection_ticket(request.params, request.force)
    }

    // -------------------------------------------------------------------------
    // apply
    // -------------------------------------------------------------------------

    /// Fold a decomposition answer into the score table and baselines.
    ///
    /// Columns superseded since the ticket was issued are skipped. A
    /// selection-scoped answer also drops rows of entities that left the
    /// selection and replaces each fresh column outright.
    ///
    /// # Errors
    ///
    /// [`MergeError::DatasetMismatch`] or [`MergeError::StaleResponse`] when
    /// the answer no longer applies; nothing is changed in either case.
    pub fn apply_decomposition(
        &mut self,
        ticket: &DecompositionTicket,
        response: Decomposition,
    ) -> Result<Applied, MergeError> {
        self.check_dataset(&ticket.dataset)?;
        self.ledger.check(&ticket.stamp)?;

        let fresh: Vec<&FeatureKey> = ticket
            .columns
            .iter()
            .filter(|(key, generation)| {
                let current = self.ledger.current_generation(key);
                let keep = **generation == current && self.selection.state().is_feature_selected(key);
                if !keep {
                    debug!(request_id = %ticket.request_id, feature = %key, "skipping superseded column");
                }
                keep
            })
            .map(|(key, _)| key)
            .collect();
        if fresh.is_empty() {
            return Err(MergeError::StaleResponse {
                scope: ticket.stamp.scope.clone(),
                generation: ticket.stamp.generation,
                current: self.ledger.epoch(),
            });
        }

        let replace = ticket.stamp.scope == RequestScope::Selection;
        let mut applied = Applied::default();
        let table = Arc::make_mut(&mut self.zscores);
        if replace {
            let selected = &self.selection.state().selected_entities;
            table.retain_entities(|id| selected.contains(id));
        }
        for key in &fresh {
            if replace {
                purge_column(table, key);
            }
            applied.cells += merge_column(table, &ColumnBatch::from_table((*key).clone(), &response.zscores));
            applied.columns += 1;
        }

        let baselines: Vec<_> = response
            .baselines
            .into_iter()
            .filter(|b| fresh.contains(&&b.feature))
            .collect();
        applied.baselines = baselines.len();
        if replace {
            self.baselines.replace_features(&fresh, baselines);
        } else {
            self.baselines.seed(baselines);
        }
        self.errors.remove(&Operation::Decomposition);

        info!(
            request_id = %ticket.request_id,
            scope = %ticket.stamp.scope,
            columns = applied.columns,
            cells = applied.cells,
            baselines = applied.baselines,
            "decomposition applied"
        );
        Ok(applied)
    }

    /// Fold raw telemetry columns into the loaded rows.
    ///
    /// # Errors
    ///
    /// [`MergeError::DatasetMismatch`] for an unloaded dataset, or
    /// [`MergeError::ShapeMismatch`] if the rows disagree with those loaded.
    pub fn apply_entity_data(&mut self, ticket: &EntityDataTicket, response: EntityData) -> Result<usize, MergeError> {
        self.check_dataset(&ticket.dataset)?;
        let mut next = (*self.telemetry).clone();
        let written = next.merge_columns(response.table)?;
        self.telemetry = Arc::new(next);
        self.errors.remove(&Operation::EntityData);
        info!(request_id = %ticket.request_id, rows = written, "telemetry merged");
        Ok(written)
    }

    /// Replace the projection, cluster map, and contributions from a refresh.
    ///
    /// # Errors
    ///
    /// [`MergeError::DatasetMismatch`] or [`MergeError::StaleResponse`].
    pub fn apply_projection(&mut self, ticket: &ProjectionTicket, response: ProjectionData) -> Result<(), MergeError> {
        self.check_dataset(&ticket.dataset)?;
        self.ledger.check(&ticket.stamp)?;
        let clusters = response.cluster_map();
        self.replace_projection(ticket, clusters, response.points, response.contributions);
        self.errors.remove(&Operation::Projection);
        Ok(())
    }

    /// Replace assignments, projection, and contributions from a recluster.
    ///
    /// A response without points keeps the current coordinates and relabels
    /// them from the new assignments.
    ///
    /// # Errors
    ///
    /// [`MergeError::DatasetMismatch`] or [`MergeError::StaleResponse`].
    pub fn apply_cluster_result(&mut self, ticket: &ProjectionTicket, response: ClusterResult) -> Result<(), MergeError> {
        self.check_dataset(&ticket.dataset)?;
        self.ledger.check(&ticket.stamp)?;
        let ClusterResult { assignments, mut points, contributions } = response;
        if points.is_empty() {
            points = self
                .projection
                .iter()
                .map(|p| ProjectedPoint { cluster: assignments.get(&p.entity_id), ..p.clone() })
                .collect();
        }
        self.replace_projection(ticket, assignments, points, contributions);
        self.errors.remove(&Operation::Clusters);
        Ok(())
    }

    /// Merge feature metadata into the catalog.
    ///
    /// # Errors
    ///
    /// [`MergeError::DatasetMismatch`] if `dataset` is no longer loaded.
    pub fn apply_feature_metadata(
        &mut self,
        dataset: &DatasetTag,
        metadata: Vec<FeatureMetadata>,
    ) -> Result<usize, MergeError> {
        self.check_dataset(dataset)?;
        let n = metadata.len();
        self.catalog.absorb(metadata);
        self.errors.remove(&Operation::FeatureMetadata);
        debug!(count = n, total = self.catalog.len(), "feature metadata merged");
        Ok(n)
    }

    // -------------------------------------------------------------------------
    // internals
    // -------------------------------------------------------------------------

    fn replace_projection(
        &mut self,
        ticket: &ProjectionTicket,
        clusters: ClusterMap,
        points: Vec<ProjectedPoint>,
        contributions: FeatureContributions,
    ) {
        info!(
            request_id = %ticket.request_id,
            clusters = clusters.clusters().len(),
            entities = clusters.len(),
            points = points.len(),
            "cluster state replaced"
        );
        self.params = ticket.params;
        self.clusters = Arc::new(clusters);
        self.projection = Arc::new(points);
        self.contributions = Arc::new(contributions);
    }

    fn check_dataset(&self, tag: &DatasetTag) -> Result<(), MergeError> {
        if *tag != self.dataset {
            return Err(MergeError::DatasetMismatch {
                expected: format!("{}#{}", self.dataset.name, self.dataset.generation),
                actual: format!("{}#{}", tag.name, tag.generation),
            });
        }
        Ok(())
    }

    fn selected_entities(&self) -> Vec<EntityId> {
        self.selection.state().selected_entities.iter().cloned().collect()
    }

    /// Selection-scoped ticket over every selected feature, or `None` when
    /// either list is empty.
    fn selection_ticket(&mut self) -> Option<DecompositionTicket> {
        let state = self.selection.state();
        if state.selected_entities.is_empty() || state.selected_features.is_empty() {
            return None;
        }
        let features = state.selected_features.clone();
        let stamp = self.ledger.issue(RequestScope::Selection);
        Some(self.decomposition_ticket(stamp, features, true, None))
    }

    /// Feature-scoped ticket, or `None` while no entity is selected.
    fn feature_ticket(&mut self, key: &FeatureKey, edit: Option<Region>) -> Option<DecompositionTicket> {
        if self.selection.state().selected_entities.is_empty() {
            self.ledger.invalidate_feature(key);
            return None;
        }
        let stamp = self.ledger.issue(RequestScope::Feature(key.clone()));
        // A fresh toggle recomputes; a baseline edit rescores against the edit.
        let recompute = edit.is_none();
        Some(self.decomposition_ticket(stamp, vec![key.clone()], recompute, edit))
    }

    fn decomposition_ticket(
        &self,
        stamp: RequestStamp,
        features: Vec<FeatureKey>,
        recompute: bool,
        baseline_edit: Option<Region>,
    ) -> DecompositionTicket {
        let columns = features
            .iter()
            .map(|k| (k.clone(), self.ledger.current_generation(k)))
            .collect();
        let ticket = DecompositionTicket {
            request_id: Uuid::new_v4(),
            dataset: self.dataset.clone(),
            stamp,
            request: DecompositionRequest { entities: self.selected_entities(), features, recompute, baseline_edit },
            columns,
        };
        debug!(
            request_id = %ticket.request_id,
            scope = %ticket.stamp.scope,
            generation = ticket.stamp.generation,
            entities = ticket.request.entities.len(),
            "decomposition ticket issued"
        );
        ticket
    }

    fn entity_data_ticket(&self, features: Vec<FeatureKey>) -> EntityDataTicket {
        EntityDataTicket { request_id: Uuid::new_v4(), dataset: self.dataset.clone(), features }
    }

    fn projection_ticket(&mut self, params: ClusterParams, force: bool) -> ProjectionTicket {
        let stamp = self.ledger.issue(RequestScope::Projection);
        ProjectionTicket { request_id: Uuid::new_v4(), dataset: self.dataset.clone(), stamp, params, force }
    }
}
