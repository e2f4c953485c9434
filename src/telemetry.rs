//! Raw telemetry rows and the series derived from them.
//!
//! The table holds every loaded `(timestamp, entity)` row with whichever
//! feature columns have been fetched so far. Views never read rows directly;
//! they ask for a [`FeatureSeries`] restricted to the selected entities, or
//! for per-cluster averages.

#[cfg(test)]
#[path = "telemetry_test.rs"]
mod telemetry_test;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterMap;
use crate::merge::MergeError;
use crate::model::{ClusterId, EntityId, FeatureKey, TimeRange, Timestamp};

/// Width of the time bins used for cluster averages.
pub const CLUSTER_AVERAGE_BIN_MS: i64 = 60_000;

// =============================================================================
// ROWS
// =============================================================================

/// One sample row: every fetched feature for one entity at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    pub timestamp: Timestamp,
    pub entity_id: EntityId,
    pub values: BTreeMap<FeatureKey, f64>,
}

impl TelemetryRow {
    #[must_use]
    pub fn value(&self, key: &FeatureKey) -> Option<f64> {
        self.values.get(key).copied().filter(|v| !v.is_nan())
    }
}

/// All loaded rows plus the feature columns they carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryTable {
    rows: Vec<TelemetryRow>,
    features: Vec<FeatureKey>,
}

impl TelemetryTable {
    #[must_use]
    pub fn new(rows: Vec<TelemetryRow>, features: Vec<FeatureKey>) -> Self {
        Self { rows, features }
    }

    #[must_use]
    pub fn rows(&self) -> &[TelemetryRow] {
        &self.rows
    }

    /// Dataset feature list, in backend order.
    #[must_use]
    pub fn features(&self) -> &[FeatureKey] {
        &self.features
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn entity_ids(&self) -> BTreeSet<EntityId> {
        self.rows.iter().map(|r| r.entity_id.clone()).collect()
    }

    /// Fold freshly fetched columns into the loaded rows.
    ///
    /// An empty table adopts `incoming` wholesale. Otherwise `incoming` must
    /// describe exactly the loaded `(timestamp, entity)` rows; anything else
    /// is rejected before a single cell changes.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::ShapeMismatch`] when the row sets disagree.
    pub fn merge_columns(&mut self, incoming: TelemetryTable) -> Result<usize, MergeError> {
        if self.rows.is_empty() {
            let n = incoming.rows.len();
            *self = incoming;
            return Ok(n);
        }

        let label = incoming
            .features
            .first()
            .cloned()
            .unwrap_or_else(|| FeatureKey::new("*"));
        if incoming.rows.len() != self.rows.len() {
            return Err(MergeError::ShapeMismatch {
                feature: label,
                expected: self.rows.len(),
                actual: incoming.rows.len(),
            });
        }

        let index: HashMap<(Timestamp, &EntityId), usize> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| ((r.timestamp, &r.entity_id), i))
            .collect();
        let mut targets = Vec::with_capacity(incoming.rows.len());
        for row in &incoming.rows {
            let Some(&i) = index.get(&(row.timestamp, &row.entity_id)) else {
                return Err(MergeError::ShapeMismatch {
                    feature: label,
                    expected: self.rows.len(),
                    actual: targets.len(),
                });
            };
            targets.push(i);
        }

        let written = incoming.rows.len();
        for (row, i) in incoming.rows.into_iter().zip(targets) {
            self.rows[i].values.extend(row.values);
        }
        for key in incoming.features {
            if !self.features.contains(&key) {
                self.features.push(key);
            }
        }
        Ok(written)
    }

    /// Points for `key` from rows of the given entities, in time order.
    #[must_use]
    pub fn series(&self, key: &FeatureKey, entities: &BTreeSet<EntityId>) -> FeatureSeries {
        let mut points: Vec<SeriesPoint> = self
            .rows
            .iter()
            .filter(|r| entities.contains(&r.entity_id))
            .filter_map(|r| {
                r.value(key).map(|value| SeriesPoint {
                    timestamp: r.timestamp,
                    value,
                    entity_id: r.entity_id.clone(),
                })
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        FeatureSeries { feature: key.clone(), points }
    }

    /// Earliest and latest timestamps present.
    #[must_use]
    pub fn time_extent(&self) -> Option<TimeRange> {
        let min = self.rows.iter().map(|r| r.timestamp).min()?;
        let max = self.rows.iter().map(|r| r.timestamp).max()?;
        Some(TimeRange::new(min, max))
    }
}

// =============================================================================
// SERIES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: Timestamp,
    pub value: f64,
    pub entity_id: EntityId,
}

/// Ordered samples of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSeries {
    pub feature: FeatureKey,
    pub points: Vec<SeriesPoint>,
}

impl FeatureSeries {
    /// Points with timestamps inside `range`, inclusive at both ends.
    #[must_use]
    pub fn window(&self, range: TimeRange) -> FeatureSeries {
        FeatureSeries {
            feature: self.feature.clone(),
            points: self.points.iter().filter(|p| range.contains(p.timestamp)).cloned().collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points belonging to one entity.
    pub fn for_entity<'a>(&'a self, id: &'a EntityId) -> impl Iterator<Item = &'a SeriesPoint> {
        self.points.iter().filter(move |p| &p.entity_id == id)
    }
}

// =============================================================================
// CLUSTER AVERAGES
// =============================================================================

/// Mean of `key` per cluster per [`CLUSTER_AVERAGE_BIN_MS`] bin, time-sorted.
///
/// Rows whose entity has no cluster or whose value is missing are skipped.
#[must_use]
pub fn cluster_average_series(
    table: &TelemetryTable,
    clusters: &ClusterMap,
    key: &FeatureKey,
) -> BTreeMap<ClusterId, Vec<(Timestamp, f64)>> {
    let mut sums: BTreeMap<ClusterId, BTreeMap<Timestamp, (f64, u32)>> = BTreeMap::new();
    for row in table.rows() {
        let Some(cluster) = clusters.get(&row.entity_id) else {
            continue;
        };
        let Some(value) = row.value(key) else {
            continue;
        };
        let bin = row.timestamp.div_euclid(CLUSTER_AVERAGE_BIN_MS) * CLUSTER_AVERAGE_BIN_MS;
        let slot = sums.entry(cluster).or_default().entry(bin).or_insert((0.0, 0));
        slot.0 += value;
        slot.1 += 1;
    }
    sums.into_iter()
        .map(|(cluster, bins)| {
            let series = bins
                .into_iter()
                .map(|(t, (sum, n))| (t, sum / f64::from(n)))
                .collect();
            (cluster, series)
        })
        .collect()
}
