//! Read-only views of coordination state.
//!
//! A [`Snapshot`] is a bundle of `Arc`s taken under the coordinator's lock.
//! It never changes after it is taken; later merges publish new tables
//! rather than editing these.

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod snapshot_test;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cluster::{ClusterMap, ClusterParams};
use crate::model::{
    BaselineRecord, ClusterId, EntityId, FeatureCatalog, FeatureContributions, FeatureKey, ProjectedPoint, Region,
    Timestamp,
};
use crate::selection::{Emphasis, SelectionState, feature_list_order};
use crate::telemetry::{FeatureSeries, TelemetryTable, cluster_average_series};
use crate::zscore::{ZScoreTable, heatmap_order};

/// Everything a view needs to render one frame.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub dataset: String,
    pub params: ClusterParams,
    pub selection: SelectionState,
    pub telemetry: Arc<TelemetryTable>,
    pub zscores: Arc<ZScoreTable>,
    pub baselines: Arc<Vec<BaselineRecord>>,
    pub clusters: Arc<ClusterMap>,
    pub projection: Arc<Vec<ProjectedPoint>>,
    pub contributions: Arc<FeatureContributions>,
    pub catalog: FeatureCatalog,
    /// Last failure, cleared by the next successful apply.
    pub error: Option<String>,
}

/// Feature × entity grid for the heatmap view.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub features: Vec<FeatureKey>,
    pub entities: Vec<EntityId>,
    /// `cells[f][e]`; `None` where no score has arrived yet.
    pub cells: Vec<Vec<Option<f64>>>,
}

impl Snapshot {
    #[must_use]
    pub fn emphasis(&self, id: &EntityId) -> Emphasis {
        self.selection.emphasis(id)
    }

    #[must_use]
    pub fn cluster_of(&self, id: &EntityId) -> Option<ClusterId> {
        self.clusters.get(id)
    }

    #[must_use]
    pub fn baseline(&self, feature: &FeatureKey) -> Option<Region> {
        self.baselines.iter().find(|r| &r.feature == feature).map(|r| r.region)
    }

    /// Time series of `key` for the selected entities.
    #[must_use]
    pub fn series(&self, key: &FeatureKey) -> FeatureSeries {
        self.telemetry.series(key, &self.selection.selected_entities)
    }

    /// Like [`Self::series`], cut to the shared time window when one is set.
    #[must_use]
    pub fn windowed_series(&self, key: &FeatureKey) -> FeatureSeries {
        let series = self.series(key);
        match self.selection.time_range {
            Some(range) => series.window(range),
            None => series,
        }
    }

    #[must_use]
    pub fn cluster_averages(&self, key: &FeatureKey) -> BTreeMap<ClusterId, Vec<(Timestamp, f64)>> {
        cluster_average_series(&self.telemetry, &self.clusters, key)
    }

    /// Selected features down, scored entities across in numeric order.
    #[must_use]
    pub fn heatmap(&self) -> Heatmap {
        let features = self.selection.selected_features.clone();
        let entities = heatmap_order(self.zscores.entity_ids());
        let cells = self.zscores.matrix(&features, &entities);
        Heatmap { features, entities, cells }
    }

    /// Dataset feature list; contribution rows are indexed by this order.
    #[must_use]
    pub fn dataset_features(&self) -> Vec<FeatureKey> {
        if self.catalog.is_empty() {
            self.telemetry.features().to_vec()
        } else {
            self.catalog.keys().cloned().collect()
        }
    }

    /// Feature picker order.
    #[must_use]
    pub fn feature_order(&self) -> Vec<FeatureKey> {
        let contributions = (!self.contributions.agg_feat_contrib_mat.is_empty()).then_some(&*self.contributions);
        feature_list_order(&self.dataset_features(), &self.selection.selected_features, contributions)
    }
}
