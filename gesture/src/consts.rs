//! Shared numeric constants for the gesture crate.

// ── Lasso ───────────────────────────────────────────────────────

/// Fewest pointer samples that can close a polygon with non-zero area.
pub const LASSO_MIN_VERTICES: usize = 3;

// ── Brush ───────────────────────────────────────────────────────

/// Absolute tolerance for value-axis brush edges, in domain units.
///
/// Pixel→domain inversion of a redrawn edge reproduces the stored value only
/// up to floating-point noise; differences under this are "unchanged".
pub const VALUE_EDGE_EPSILON: f64 = 1e-6;

/// Relative tolerance for value-axis brush edges, scaled by the edge magnitude.
pub const VALUE_EDGE_RELATIVE_EPSILON: f64 = 1e-9;
