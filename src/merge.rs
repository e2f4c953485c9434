//! Partial-result merging.
//!
//! DESIGN
//! ======
//! Backend answers arrive one feature at a time and cover only the entities
//! they were asked about. Folding one in must touch exactly one column of
//! exactly those entities; every other cell is left alone. Applying the same
//! batch twice is the same as applying it once.
//!
//! Ordering between independently issued requests is handled by the
//! [`RequestLedger`]: each request is stamped with a per-feature generation
//! and the selection epoch it was issued under, and a response is accepted
//! only while both are still current. A slow answer to a superseded request
//! is discarded instead of overwriting a newer one.

#[cfg(test)]
#[path = "merge_test.rs"]
mod merge_test;

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ErrorCode;
use crate::model::{BaselineRecord, EntityId, FeatureKey};
use crate::zscore::ZScoreTable;

// =============================================================================
// ERROR
// =============================================================================

/// Reasons a backend answer is not folded into state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MergeError {
    /// Incoming column length disagrees with the loaded table.
    #[error("shape mismatch for {feature}: expected {expected} rows, got {actual}")]
    ShapeMismatch { feature: FeatureKey, expected: usize, actual: usize },

    /// A newer request for the same scope was issued after this one.
    #[error("stale response for {scope}: generation {generation}, current {current}")]
    StaleResponse { scope: RequestScope, generation: u64, current: u64 },

    /// The response belongs to a dataset that is no longer loaded.
    #[error("response for dataset {actual} but {expected} is loaded")]
    DatasetMismatch { expected: String, actual: String },
}

impl ErrorCode for MergeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ShapeMismatch { .. } => "E_SHAPE_MISMATCH",
            Self::StaleResponse { .. } => "E_STALE_RESPONSE",
            Self::DatasetMismatch { .. } => "E_DATASET_MISMATCH",
        }
    }
}

// =============================================================================
// COLUMN MERGE
// =============================================================================

/// One feature's scores for a subset of entities.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBatch {
    pub feature: FeatureKey,
    pub values: BTreeMap<EntityId, f64>,
}

impl ColumnBatch {
    #[must_use]
    pub fn new(feature: FeatureKey) -> Self {
        Self { feature, values: BTreeMap::new() }
    }

    /// Extract `feature`'s column from a full table, skipping entities that
    /// have no value for it.
    #[must_use]
    pub fn from_table(feature: FeatureKey, table: &ZScoreTable) -> Self {
        let values = table
            .iter()
            .filter_map(|(id, row)| row.value(&feature).map(|v| (id.clone(), v)))
            .collect();
        Self { feature, values }
    }

    #[must_use]
    pub fn with(mut self, id: impl Into<EntityId>, value: f64) -> Self {
        self.values.insert(id.into(), value);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Set `batch.feature` for every entity in the batch. Returns the number of
/// cells written.
pub fn merge_column(table: &mut ZScoreTable, batch: &ColumnBatch) -> usize {
    for (id, value) in &batch.values {
        table.row_mut(id.clone()).set(batch.feature.clone(), *value);
    }
    batch.values.len()
}

/// Remove `feature` from every row. Returns the number of rows that had it.
pub fn purge_column(table: &mut ZScoreTable, feature: &FeatureKey) -> usize {
    let mut removed = 0;
    for row in table.rows_mut() {
        if row.remove(feature) {
            removed += 1;
        }
    }
    removed
}

// =============================================================================
// BASELINE UPSERT
// =============================================================================

/// Where an upserted baseline landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Replaced(usize),
    Appended(usize),
}

/// Replace the record for `record.feature` in place, or append it.
pub fn upsert_baseline(list: &mut Vec<BaselineRecord>, record: BaselineRecord) -> Upsert {
    if let Some(idx) = list.iter().position(|r| r.feature == record.feature) {
        list[idx] = record;
        Upsert::Replaced(idx)
    } else {
        list.push(record);
        Upsert::Appended(list.len() - 1)
    }
}

// =============================================================================
// REQUEST LEDGER
// =============================================================================

/// What a backend request answers for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestScope {
    /// A single feature's column (toggle on, baseline edit).
    Feature(FeatureKey),
    /// The whole selection (entity selection change, initial load).
    Selection,
    /// Embedding and cluster assignments; independent of the selection.
    Projection,
}

impl fmt::Display for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feature(key) => write!(f, "feature:{key}"),
            Self::Selection => f.write_str("selection"),
            Self::Projection => f.write_str("projection"),
        }
    }
}

/// Generation stamp attached to an issued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestStamp {
    pub scope: RequestScope,
    pub generation: u64,
    pub epoch: u64,
}

/// Tracks the latest issued generation per scope.
///
/// The selection epoch advances on every selection-scoped request and on
/// dataset switch; feature-scoped responses from an older epoch are stale
/// because they answer for a different entity set.
#[derive(Debug, Clone, Default)]
pub struct RequestLedger {
    features: BTreeMap<FeatureKey, u64>,
    epoch: u64,
    projection: u64,
}

impl RequestLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a new request for `scope`, superseding earlier ones.
    pub fn issue(&mut self, scope: RequestScope) -> RequestStamp {
        match &scope {
            RequestScope::Feature(key) => {
                let generation = self.bump_feature(key);
                RequestStamp { scope, generation, epoch: self.epoch }
            }
            RequestScope::Selection => {
                self.epoch += 1;
                RequestStamp { scope, generation: self.epoch, epoch: self.epoch }
            }
            RequestScope::Projection => {
                self.projection += 1;
                RequestStamp { scope, generation: self.projection, epoch: self.epoch }
            }
        }
    }

    /// Supersede in-flight requests for `key` without issuing a new one.
    pub fn invalidate_feature(&mut self, key: &FeatureKey) {
        self.bump_feature(key);
    }

    /// Supersede every in-flight selection- and feature-scoped request.
    pub fn advance_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Supersede everything in flight, projection included.
    pub fn supersede_all(&mut self) {
        self.epoch += 1;
        self.projection += 1;
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn current_generation(&self, key: &FeatureKey) -> u64 {
        self.features.get(key).copied().unwrap_or(0)
    }

    /// Accept `stamp` only if nothing newer was issued for its scope.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::StaleResponse`] when superseded.
    pub fn check(&self, stamp: &RequestStamp) -> Result<(), MergeError> {
        let stale = |current: u64| MergeError::StaleResponse {
            scope: stamp.scope.clone(),
            generation: stamp.generation,
            current,
        };
        match &stamp.scope {
            RequestScope::Projection => {
                if stamp.generation != self.projection {
                    return Err(stale(self.projection));
                }
                return Ok(());
            }
            RequestScope::Feature(key) => {
                if stamp.epoch != self.epoch {
                    return Err(stale(self.epoch));
                }
                let current = self.current_generation(key);
                if stamp.generation != current {
                    return Err(stale(current));
                }
            }
            RequestScope::Selection => {
                if stamp.epoch != self.epoch {
                    return Err(stale(self.epoch));
                }
            }
        }
        Ok(())
    }

    fn bump_feature(&mut self, key: &FeatureKey) -> u64 {
        let slot = self.features.entry(key.clone()).or_insert(0);
        *slot += 1;
        *slot
    }
}
