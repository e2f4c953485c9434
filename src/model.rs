//! Identifiers, ranges, and backend-produced records shared by every view.
//!
//! Entity and feature identifiers are string newtypes so they cannot be
//! swapped by accident; both order lexically and serialize as plain strings.
//! Time is epoch milliseconds throughout.

#[cfg(test)]
#[path = "model_test.rs"]
mod model_test;

use std::collections::BTreeMap;
use std::fmt;

use gesture::brush::{Interval, Rect};
use serde::{Deserialize, Serialize};

/// Epoch milliseconds.
pub type Timestamp = i64;

/// Cluster label assigned by the backend.
pub type ClusterId = i64;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// A monitored compute node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing decimal digits of the ID, e.g. `130` for `farm-130`.
    #[must_use]
    pub fn trailing_number(&self) -> Option<u64> {
        let head = self.0.trim_end_matches(|c: char| c.is_ascii_digit());
        let tail = &self.0[head.len()..];
        if tail.is_empty() {
            return None;
        }
        tail.bytes()
            .try_fold(0u64, |acc, b| acc.checked_mul(10)?.checked_add(u64::from(b - b'0')))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A named measurement channel such as `cpu_idle`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureKey(String);

impl FeatureKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FeatureKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// RANGES
// =============================================================================

/// Inclusive time range in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    #[must_use]
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, t: Timestamp) -> bool {
        t >= self.start && t <= self.end
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_interval(&self) -> Interval {
        Interval::new(self.start as f64, self.end as f64)
    }
}

/// Inclusive value range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn as_interval(&self) -> Interval {
        Interval::new(self.min, self.max)
    }
}

/// A baseline window: reference time span and value band for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub time: TimeRange,
    pub value: ValueRange,
}

impl Region {
    #[must_use]
    pub fn new(time: TimeRange, value: ValueRange) -> Self {
        Self { time, value }
    }

    #[must_use]
    pub fn to_rect(&self) -> Rect {
        Rect::new(self.time.as_interval(), self.value.as_interval())
    }

    /// Convert a data-space rectangle, rounding time edges to whole
    /// milliseconds so they can be compared exactly.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            time: TimeRange::new(rect.time.lo.round() as i64, rect.time.hi.round() as i64),
            value: ValueRange::new(rect.value.lo, rect.value.hi),
        }
    }
}

/// The committed baseline for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub feature: FeatureKey,
    pub region: Region,
}

// =============================================================================
// FEATURE METADATA
// =============================================================================

/// Per-feature descriptive metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMetadata {
    pub key: FeatureKey,
    pub units: Option<String>,
}

/// The explicit set of feature keys known for the loaded dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureCatalog {
    entries: Vec<FeatureMetadata>,
}

impl FeatureCatalog {
    #[must_use]
    pub fn new(entries: Vec<FeatureMetadata>) -> Self {
        Self { entries }
    }

    /// Catalog of bare keys with no metadata.
    #[must_use]
    pub fn from_keys(keys: &[FeatureKey]) -> Self {
        Self::new(keys.iter().map(|k| FeatureMetadata { key: k.clone(), units: None }).collect())
    }

    #[must_use]
    pub fn contains(&self, key: &FeatureKey) -> bool {
        self.entries.iter().any(|e| &e.key == key)
    }

    #[must_use]
    pub fn units(&self, key: &FeatureKey) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| &e.key == key)
            .and_then(|e| e.units.as_deref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &FeatureKey> {
        self.entries.iter().map(|e| &e.key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fill in units for keys already present, and append unknown keys.
    pub fn absorb(&mut self, metadata: Vec<FeatureMetadata>) {
        for incoming in metadata {
            match self.entries.iter_mut().find(|e| e.key == incoming.key) {
                Some(existing) => existing.units = incoming.units,
                None => self.entries.push(incoming),
            }
        }
    }
}

// =============================================================================
// PROJECTION
// =============================================================================

/// Embedding method for the 2D similarity view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProjectionMethod {
    Umap,
    Tsne,
    Pca,
}

impl ProjectionMethod {
    pub const ALL: [ProjectionMethod; 3] = [Self::Umap, Self::Tsne, Self::Pca];

    /// Column names the backend uses for the two coordinates.
    #[must_use]
    pub fn wire_keys(self) -> (&'static str, &'static str) {
        match self {
            Self::Umap => ("UMAP1", "UMAP2"),
            Self::Tsne => ("tSNE1", "tSNE2"),
            Self::Pca => ("PC1", "PC2"),
        }
    }
}

/// One entity's position in the embedding, per available method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    pub entity_id: EntityId,
    pub cluster: Option<ClusterId>,
    pub coordinates: BTreeMap<ProjectionMethod, (f64, f64)>,
}

impl ProjectedPoint {
    #[must_use]
    pub fn coordinates(&self, method: ProjectionMethod) -> Option<(f64, f64)> {
        self.coordinates.get(&method).copied()
    }
}

/// Per-feature, per-cluster contribution weights.
///
/// Row `i` of `agg_feat_contrib_mat` belongs to the `i`th feature of the
/// dataset's feature list; column `j` to cluster `order_col[j]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureContributions {
    pub agg_feat_contrib_mat: Vec<Vec<f64>>,
    pub order_col: Vec<ClusterId>,
}

impl FeatureContributions {
    /// Largest absolute contribution in row `row`, if the row exists.
    #[must_use]
    pub fn max_abs(&self, row: usize) -> Option<f64> {
        let values = self.agg_feat_contrib_mat.get(row)?;
        values.iter().map(|v| v.abs()).reduce(f64::max)
    }
}
