//! Sparse per-entity anomaly score table.
//!
//! Rows are keyed by entity and hold only the features the backend has
//! answered for. A missing key means "no score yet", which is different from
//! a score of zero, so callers ask [`ZScoreRow::has_value`] rather than
//! defaulting.

#[cfg(test)]
#[path = "zscore_test.rs"]
mod zscore_test;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{EntityId, FeatureKey};

/// Scores for one entity, keyed by feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZScoreRow {
    scores: BTreeMap<FeatureKey, f64>,
}

impl ZScoreRow {
    #[must_use]
    pub fn new(scores: BTreeMap<FeatureKey, f64>) -> Self {
        Self { scores }
    }

    #[must_use]
    pub fn has_value(&self, key: &FeatureKey) -> bool {
        self.scores.contains_key(key)
    }

    #[must_use]
    pub fn value(&self, key: &FeatureKey) -> Option<f64> {
        self.scores.get(key).copied()
    }

    pub fn features(&self) -> impl Iterator<Item = &FeatureKey> {
        self.scores.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub(crate) fn set(&mut self, key: FeatureKey, value: f64) {
        self.scores.insert(key, value);
    }

    pub(crate) fn remove(&mut self, key: &FeatureKey) -> bool {
        self.scores.remove(key).is_some()
    }
}

/// Entity → sparse score row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZScoreTable {
    rows: BTreeMap<EntityId, ZScoreRow>,
}

impl ZScoreTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn row(&self, id: &EntityId) -> Option<&ZScoreRow> {
        self.rows.get(id)
    }

    #[must_use]
    pub fn value(&self, id: &EntityId, key: &FeatureKey) -> Option<f64> {
        self.rows.get(id).and_then(|r| r.value(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &ZScoreRow)> {
        self.rows.iter()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.rows.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether any row carries a score for `key`.
    #[must_use]
    pub fn has_column(&self, key: &FeatureKey) -> bool {
        self.rows.values().any(|r| r.has_value(key))
    }

    /// Feature × entity grid for a heatmap. Holes are `None`.
    #[must_use]
    pub fn matrix(&self, features: &[FeatureKey], order: &[EntityId]) -> Vec<Vec<Option<f64>>> {
        features
            .iter()
            .map(|f| order.iter().map(|id| self.value(id, f)).collect())
            .collect()
    }

    pub(crate) fn row_mut(&mut self, id: EntityId) -> &mut ZScoreRow {
        self.rows.entry(id).or_default()
    }

    pub(crate) fn rows_mut(&mut self) -> impl Iterator<Item = &mut ZScoreRow> {
        self.rows.values_mut()
    }

    /// Drop rows whose entity fails `keep`. Returns how many were dropped.
    pub(crate) fn retain_entities(&mut self, mut keep: impl FnMut(&EntityId) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|id, _| keep(id));
        before - self.rows.len()
    }
}

impl FromIterator<(EntityId, ZScoreRow)> for ZScoreTable {
    fn from_iter<I: IntoIterator<Item = (EntityId, ZScoreRow)>>(iter: I) -> Self {
        Self { rows: iter.into_iter().collect() }
    }
}

/// Heatmap column order: by trailing number, so `farm-6` precedes
/// `farm-16` precedes `farm-130`. IDs without a number follow, lexically.
#[must_use]
pub fn heatmap_order<'a>(ids: impl IntoIterator<Item = &'a EntityId>) -> Vec<EntityId> {
    let mut out: Vec<EntityId> = ids.into_iter().cloned().collect();
    out.sort_by(|a, b| match (a.trailing_number(), b.trailing_number()) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    });
    out.dedup();
    out
}
