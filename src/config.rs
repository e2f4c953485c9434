//! Runtime configuration from environment variables and a presets file.
//!
//! Numeric knobs follow one policy: a missing or malformed value falls back
//! to its default. The presets file is different; if one is named it must
//! parse, since silently dropping a dataset's defaults would be surprising.
//!
//! Presets file shape (dataset name → defaults):
//!
//! ```json
//! {
//!   "ganglia_2024-02-21.csv": {
//!     "selectedPoints": ["novadaq-far-farm-06"],
//!     "selectedDims": ["cpu_idle", "mem_total"],
//!     "bStart": "2024-02-21 18:47:30Z",
//!     "bEnd": "2024-02-21 22:00:00Z",
//!     "nNeighbors": 15,
//!     "minDist": 0.1,
//!     "numClusters": 4
//!   }
//! }
//! ```

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::backend::retry::RetryPolicy;
use crate::backend::wire;
use crate::cluster::ClusterParams;
use crate::error::ErrorCode;
use crate::model::{EntityId, FeatureKey, TimeRange};
use crate::selection::SelectionState;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5010";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RETRIES: usize = 3;
pub const DEFAULT_RETRY_BASE_MS: u64 = 200;
pub const DEFAULT_CLUSTER_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_DATASET: &str = "ganglia_2024-02-21.csv";

pub const DEFAULT_N_NEIGHBORS: u32 = 50;
pub const DEFAULT_MIN_DIST: f64 = 0.3;
pub const DEFAULT_NUM_CLUSTERS: u32 = 4;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The presets file could not be read.
    #[error("failed to read presets file {path}: {reason}")]
    PresetsRead { path: String, reason: String },

    /// The presets file is not valid preset JSON.
    #[error("invalid presets file: {0}")]
    PresetsParse(String),

    /// A preset carries a time that no supported format matches.
    #[error("invalid time in preset {dataset}: {reason}")]
    PresetTime { dataset: String, reason: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::PresetsRead { .. } => "E_PRESETS_READ",
            Self::PresetsParse(_) => "E_PRESETS_PARSE",
            Self::PresetTime { .. } => "E_PRESET_TIME",
        }
    }
}

// =============================================================================
// PRESETS
// =============================================================================

/// Initial state for one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPreset {
    pub dataset: String,
    pub selected_entities: Vec<EntityId>,
    pub selected_features: Vec<FeatureKey>,
    pub time_range: Option<TimeRange>,
    pub params: ClusterParams,
}

impl DatasetPreset {
    /// Preset with no selections and default cluster parameters.
    #[must_use]
    pub fn empty(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            selected_entities: Vec::new(),
            selected_features: Vec::new(),
            time_range: None,
            params: ClusterParams {
                n_neighbors: DEFAULT_N_NEIGHBORS,
                min_dist: DEFAULT_MIN_DIST,
                num_clusters: DEFAULT_NUM_CLUSTERS,
            },
        }
    }

    /// Selection state this preset starts from.
    #[must_use]
    pub fn selection_state(&self) -> SelectionState {
        SelectionState {
            selected_entities: self.selected_entities.iter().cloned().collect(),
            selected_features: dedup_keep_first(&self.selected_features),
            hovered_entity: None,
            time_range: self.time_range,
        }
    }
}

fn dedup_keep_first(keys: &[FeatureKey]) -> Vec<FeatureKey> {
    let mut out: Vec<FeatureKey> = Vec::with_capacity(keys.len());
    for key in keys {
        if !out.contains(key) {
            out.push(key.clone());
        }
    }
    out
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresetWire {
    #[serde(default)]
    selected_points: Vec<String>,
    #[serde(default)]
    selected_dims: Vec<String>,
    #[serde(default)]
    b_start: Option<String>,
    #[serde(default)]
    b_end: Option<String>,
    #[serde(default)]
    n_neighbors: Option<u32>,
    #[serde(default)]
    min_dist: Option<f64>,
    #[serde(default)]
    num_clusters: Option<u32>,
}

/// Parse a presets document.
///
/// A preset whose `bStart`/`bEnd` is missing or empty has no time range.
///
/// # Errors
///
/// Returns [`ConfigError::PresetsParse`] for malformed JSON and
/// [`ConfigError::PresetTime`] for unreadable times.
pub fn parse_presets(json: &str) -> Result<BTreeMap<String, DatasetPreset>, ConfigError> {
    let wire: BTreeMap<String, PresetWire> =
        serde_json::from_str(json).map_err(|e| ConfigError::PresetsParse(e.to_string()))?;

    let mut presets = BTreeMap::new();
    for (dataset, w) in wire {
        let defaults = DatasetPreset::empty(dataset.clone());
        let time = |raw: &str| {
            wire::parse_time_str(raw)
                .map_err(|e| ConfigError::PresetTime { dataset: dataset.clone(), reason: e.to_string() })
        };
        let time_range = match (w.b_start.as_deref(), w.b_end.as_deref()) {
            (Some(s), Some(e)) if !s.is_empty() && !e.is_empty() => Some(TimeRange::new(time(s)?, time(e)?)),
            _ => None,
        };
        let preset = DatasetPreset {
            selected_entities: w.selected_points.into_iter().map(EntityId::from).collect(),
            selected_features: w.selected_dims.into_iter().map(FeatureKey::from).collect(),
            time_range,
            params: ClusterParams {
                n_neighbors: w.n_neighbors.unwrap_or(defaults.params.n_neighbors),
                min_dist: w.min_dist.unwrap_or(defaults.params.min_dist),
                num_clusters: w.num_clusters.unwrap_or(defaults.params.num_clusters),
            },
            dataset: dataset.clone(),
        };
        presets.insert(dataset, preset);
    }
    Ok(presets)
}

/// Read and parse a presets file.
///
/// # Errors
///
/// Returns [`ConfigError::PresetsRead`] if the file cannot be read, or any
/// error from [`parse_presets`].
pub fn load_presets(path: &Path) -> Result<BTreeMap<String, DatasetPreset>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::PresetsRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_presets(&text)
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodescopeConfig {
    pub backend_url: String,
    pub timeouts: BackendTimeouts,
    pub retry: RetryPolicy,
    pub cluster_debounce: Duration,
    pub dataset: String,
    pub presets: BTreeMap<String, DatasetPreset>,
}

impl NodescopeConfig {
    /// Build config from environment variables.
    ///
    /// - `NODESCOPE_BACKEND_URL`: default `http://127.0.0.1:5010`
    /// - `NODESCOPE_REQUEST_TIMEOUT_SECS`: default 120
    /// - `NODESCOPE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `NODESCOPE_RETRIES`: total attempts, default 3
    /// - `NODESCOPE_RETRY_BASE_MS`: default 200
    /// - `NODESCOPE_CLUSTER_DEBOUNCE_MS`: default 300
    /// - `NODESCOPE_DATASET`: default `ganglia_2024-02-21.csv`
    /// - `NODESCOPE_DATASETS_FILE`: optional presets JSON
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] only if a named presets file is unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let presets = match std::env::var("NODESCOPE_DATASETS_FILE") {
            Ok(path) if !path.trim().is_empty() => load_presets(Path::new(path.trim()))?,
            _ => BTreeMap::new(),
        };
        Ok(Self {
            backend_url: env_string("NODESCOPE_BACKEND_URL", DEFAULT_BACKEND_URL)
                .trim_end_matches('/')
                .to_string(),
            timeouts: BackendTimeouts {
                request_secs: env_parse("NODESCOPE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
                connect_secs: env_parse("NODESCOPE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            },
            retry: RetryPolicy {
                attempts: env_parse("NODESCOPE_RETRIES", DEFAULT_RETRIES),
                base_ms: env_parse("NODESCOPE_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS),
            },
            cluster_debounce: Duration::from_millis(env_parse(
                "NODESCOPE_CLUSTER_DEBOUNCE_MS",
                DEFAULT_CLUSTER_DEBOUNCE_MS,
            )),
            dataset: env_string("NODESCOPE_DATASET", DEFAULT_DATASET),
            presets,
        })
    }

    /// Preset for `dataset`, or an empty one if none is configured.
    #[must_use]
    pub fn preset(&self, dataset: &str) -> DatasetPreset {
        self.presets
            .get(dataset)
            .cloned()
            .unwrap_or_else(|| DatasetPreset::empty(dataset))
    }

    /// Preset for the configured starting dataset.
    #[must_use]
    pub fn initial_preset(&self) -> DatasetPreset {
        self.preset(&self.dataset)
    }
}

fn env_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
