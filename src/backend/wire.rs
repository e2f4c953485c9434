//! Wire formats of the compute backend.
//!
//! Everything here is pure: JSON text in, typed values out. The HTTP client
//! only moves bytes, so every response shape is tested without a server.
//!
//! The backend is loose about types: cluster labels come back as floats,
//! entity IDs occasionally as numbers, missing scores as `null` or `NaN`.
//! Parsing normalizes all of that here so the rest of the crate never sees it.

#[cfg(test)]
#[path = "wire_test.rs"]
mod wire_test;

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use time::macros::format_description;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, PrimitiveDateTime};

use super::{BackendError, ClusterResult, Decomposition, EntityData, ProjectionData};
use crate::model::{
    BaselineRecord, ClusterId, EntityId, FeatureContributions, FeatureKey, FeatureMetadata, ProjectedPoint,
    ProjectionMethod, Region, TimeRange, Timestamp, ValueRange,
};
use crate::telemetry::{TelemetryRow, TelemetryTable};
use crate::zscore::{ZScoreRow, ZScoreTable};

const ENTITY_FIELD: &str = "nodeId";
const CLUSTER_FIELD: &str = "Cluster";
const TIMESTAMP_FIELD: &str = "timestamp";

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct EntityDataWire {
    records: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    features: Vec<String>,
}

#[derive(Deserialize)]
struct ProjectionWire {
    dr_features: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    feat_contributions: Option<ContributionsWire>,
}

#[derive(Deserialize)]
struct ClusterResultWire {
    node_cluster_map: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    dr_features: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    feat_contributions: Option<ContributionsWire>,
}

#[derive(Deserialize)]
struct ContributionsWire {
    #[serde(default)]
    agg_feat_contrib_mat: Vec<Vec<Value>>,
    #[serde(default)]
    order_col: Vec<Value>,
}

#[derive(Deserialize)]
struct DecompositionWire {
    #[serde(default)]
    zscores: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    baselines: Vec<BaselineWire>,
}

#[derive(Deserialize)]
struct BaselineWire {
    feature: String,
    b_start: Value,
    b_end: Value,
    v_min: f64,
    v_max: f64,
}

#[derive(Deserialize)]
struct MetadataWire {
    filename: String,
    #[serde(default)]
    units: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

fn from_json<'a, T: Deserialize<'a>>(json: &'a str) -> Result<T, BackendError> {
    serde_json::from_str(json).map_err(|e| BackendError::Parse(e.to_string()))
}

/// Parse `/entityData`: raw rows plus the feature columns they carry.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] if a row lacks an entity ID or timestamp.
pub fn parse_entity_data(json: &str) -> Result<EntityData, BackendError> {
    let wire: EntityDataWire = from_json(json)?;
    let mut features: Vec<FeatureKey> = wire.features.into_iter().map(FeatureKey::from).collect();
    if features.is_empty() {
        if let Some(first) = wire.records.first() {
            features = first
                .keys()
                .filter(|k| k.as_str() != ENTITY_FIELD && k.as_str() != TIMESTAMP_FIELD)
                .map(|k| FeatureKey::from(k.as_str()))
                .collect();
        }
    }

    let mut rows = Vec::with_capacity(wire.records.len());
    for record in wire.records {
        let entity_id = entity_field(&record)?;
        let timestamp = match record.get(TIMESTAMP_FIELD) {
            Some(raw) => parse_time(raw)?,
            None => return Err(BackendError::Parse(format!("row for {entity_id} has no {TIMESTAMP_FIELD}"))),
        };
        let values = features
            .iter()
            .filter_map(|key| record.get(key.as_str()).and_then(number).map(|v| (key.clone(), v)))
            .collect();
        rows.push(TelemetryRow { timestamp, entity_id, values });
    }
    Ok(EntityData { table: TelemetryTable::new(rows, features) })
}

/// Parse `/drTimeData`.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] on malformed JSON or a point without ID.
pub fn parse_projection(json: &str) -> Result<ProjectionData, BackendError> {
    let wire: ProjectionWire = from_json(json)?;
    Ok(ProjectionData {
        points: projected_points(&wire.dr_features)?,
        contributions: contributions(wire.feat_contributions),
    })
}

/// Parse `/recomputeClusters`.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] on malformed JSON or an unlabeled entity.
pub fn parse_cluster_result(json: &str) -> Result<ClusterResult, BackendError> {
    let wire: ClusterResultWire = from_json(json)?;
    let mut assignments = Vec::with_capacity(wire.node_cluster_map.len());
    for entry in &wire.node_cluster_map {
        let id = entity_field(entry)?;
        let Some(cluster) = entry.get(CLUSTER_FIELD).and_then(cluster_label) else {
            return Err(BackendError::Parse(format!("no cluster label for {id}")));
        };
        assignments.push((id, cluster));
    }
    Ok(ClusterResult {
        assignments: assignments.into_iter().collect(),
        points: projected_points(&wire.dr_features)?,
        contributions: contributions(wire.feat_contributions),
    })
}

/// Parse `/mrdmd`.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] on malformed JSON, a score row without an
/// entity ID, or an unreadable baseline time.
pub fn parse_decomposition(json: &str) -> Result<Decomposition, BackendError> {
    let wire: DecompositionWire = from_json(json)?;

    let mut zscores = Vec::with_capacity(wire.zscores.len());
    for row in &wire.zscores {
        let id = entity_field(row)?;
        let scores: BTreeMap<FeatureKey, f64> = row
            .iter()
            .filter(|(k, _)| k.as_str() != ENTITY_FIELD)
            .filter_map(|(k, v)| number(v).map(|n| (FeatureKey::from(k.as_str()), n)))
            .collect();
        zscores.push((id, ZScoreRow::new(scores)));
    }

    let mut baselines = Vec::with_capacity(wire.baselines.len());
    for b in wire.baselines {
        let time = TimeRange::new(parse_time(&b.b_start)?, parse_time(&b.b_end)?);
        baselines.push(BaselineRecord {
            feature: FeatureKey::from(b.feature),
            region: Region::new(time, ValueRange::new(b.v_min, b.v_max)),
        });
    }

    Ok(Decomposition { zscores: zscores.into_iter().collect::<ZScoreTable>(), baselines })
}

/// Parse `/featureMetadata`. The feature key is the file name without `.json`.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] on malformed JSON.
pub fn parse_feature_metadata(json: &str) -> Result<Vec<FeatureMetadata>, BackendError> {
    let wire: Vec<MetadataWire> = from_json(json)?;
    Ok(wire
        .into_iter()
        .map(|m| {
            let stem = m.filename.strip_suffix(".json").unwrap_or(&m.filename);
            FeatureMetadata { key: FeatureKey::from(stem), units: m.units.filter(|u| !u.is_empty()) }
        })
        .collect())
}

// =============================================================================
// FIELD HELPERS
// =============================================================================

fn entity_field(record: &BTreeMap<String, Value>) -> Result<EntityId, BackendError> {
    match record.get(ENTITY_FIELD) {
        Some(Value::String(s)) => Ok(EntityId::from(s.as_str())),
        Some(Value::Number(n)) => Ok(EntityId::new(n.to_string())),
        _ => Err(BackendError::Parse(format!("record without {ENTITY_FIELD}"))),
    }
}

/// Finite number, or `None` for `null`, strings, and `NaN` placeholders.
fn number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

#[allow(clippy::cast_possible_truncation)]
fn cluster_label(value: &Value) -> Option<ClusterId> {
    value.as_i64().or_else(|| number(value).map(|v| v.round() as ClusterId))
}

fn projected_points(rows: &[BTreeMap<String, Value>]) -> Result<Vec<ProjectedPoint>, BackendError> {
    let mut points = Vec::with_capacity(rows.len());
    for row in rows {
        let entity_id = entity_field(row)?;
        let coordinates = ProjectionMethod::ALL
            .iter()
            .filter_map(|&method| {
                let (kx, ky) = method.wire_keys();
                let x = row.get(kx).and_then(number)?;
                let y = row.get(ky).and_then(number)?;
                Some((method, (x, y)))
            })
            .collect();
        points.push(ProjectedPoint {
            entity_id,
            cluster: row.get(CLUSTER_FIELD).and_then(cluster_label),
            coordinates,
        });
    }
    Ok(points)
}

fn contributions(wire: Option<ContributionsWire>) -> FeatureContributions {
    let Some(wire) = wire else {
        return FeatureContributions::default();
    };
    FeatureContributions {
        agg_feat_contrib_mat: wire
            .agg_feat_contrib_mat
            .iter()
            .map(|row| row.iter().map(|v| number(v).unwrap_or(0.0)).collect())
            .collect(),
        order_col: wire.order_col.iter().filter_map(cluster_label).collect(),
    }
}

// =============================================================================
// TIME
// =============================================================================

/// Parse a wire timestamp into epoch milliseconds.
///
/// Accepts numbers (already epoch ms), RFC 3339, RFC 1123 with a `GMT` zone
/// (`Wed, 21 Feb 2024 18:47:30 GMT`), and `2024-02-21 18:47:30` with an
/// optional trailing `Z`. Zone-less forms are read as UTC.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] when no format matches.
#[allow(clippy::cast_possible_truncation)]
pub fn parse_time(raw: &Value) -> Result<Timestamp, BackendError> {
    match raw {
        Value::Number(n) => match n.as_i64() {
            Some(ms) => Ok(ms),
            None => number(raw)
                .map(|v| v.round() as Timestamp)
                .ok_or_else(|| BackendError::Parse(format!("bad timestamp {n}"))),
        },
        Value::String(s) => parse_time_str(s),
        other => Err(BackendError::Parse(format!("bad timestamp {other}"))),
    }
}

/// String form of [`parse_time`].
///
/// # Errors
///
/// Returns [`BackendError::Parse`] when no format matches.
pub fn parse_time_str(raw: &str) -> Result<Timestamp, BackendError> {
    let s = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return to_millis(dt);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(s, HTTP_DATE) {
        return to_millis(dt.assume_utc());
    }
    let plain = s.strip_suffix('Z').unwrap_or(s);
    match PrimitiveDateTime::parse(plain, PLAIN_DATE) {
        Ok(dt) => to_millis(dt.assume_utc()),
        Err(e) => Err(BackendError::Parse(format!("bad timestamp {raw:?}: {e}"))),
    }
}

/// Render epoch milliseconds as an RFC 1123 `GMT` date for request paths.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] if `ms` is outside the representable range.
pub fn format_http_time(ms: Timestamp) -> Result<String, BackendError> {
    let dt = OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|e| BackendError::Parse(e.to_string()))?;
    dt.format(HTTP_DATE).map_err(|e| BackendError::Parse(e.to_string()))
}

const HTTP_DATE: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT");

const PLAIN_DATE: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

fn to_millis(dt: OffsetDateTime) -> Result<Timestamp, BackendError> {
    Timestamp::try_from(dt.unix_timestamp_nanos() / 1_000_000).map_err(|e| BackendError::Parse(e.to_string()))
}
