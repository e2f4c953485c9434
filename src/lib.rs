//! Selection and coordination engine for a multi-view cluster telemetry
//! dashboard.
//!
//! Views (projection scatter, z-score heatmap, per-feature time series,
//! feature picker) share one selection and one set of backend-computed
//! tables. This crate owns that shared state, decides what to ask the compute
//! backend when a selection changes, and folds answers back in without
//! letting a late answer overwrite a newer one.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`model`] | Identifiers, ranges, baselines, projection records |
//! | [`error`] | `ErrorCode` trait shared by every error enum |
//! | [`selection`] | Selection state and its only mutator |
//! | [`zscore`] | Sparse per-entity anomaly scores |
//! | [`telemetry`] | Raw rows and derived series |
//! | [`merge`] | Column merge/purge and request staleness ledger |
//! | [`baseline`] | Per-feature baseline brush editing |
//! | [`cluster`] | Cluster maps and debounced reclustering |
//! | [`bus`] | Synchronous publish/subscribe between views |
//! | [`backend`] | Compute backend trait, HTTP client, retry |
//! | [`config`] | Environment config and dataset presets |
//! | [`coordinator`] | Owned coordination state and request tickets |
//! | [`snapshot`] | Immutable per-frame views of that state |
//! | [`session`] | Coordinator behind a lock, wired to a backend |
//! | [`context`] | Per-view handle: session plus event bus |

pub mod backend;
pub mod baseline;
pub mod bus;
pub mod cluster;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod merge;
pub mod model;
pub mod selection;
pub mod session;
pub mod snapshot;
pub mod telemetry;
pub mod zscore;

#[cfg(test)]
#[path = "helpers_test.rs"]
pub(crate) mod test_helpers;
