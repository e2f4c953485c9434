//! Pointer-gesture arithmetic for the telemetry dashboard views.
//!
//! This crate holds everything about interaction that can be decided without
//! knowing what the marks on screen mean: converting between pixel space and
//! data domains, testing which marks a free-form lasso encloses, and the
//! per-edge clamp/diff arithmetic behind rectangular brushes. Hosts feed raw
//! pointer samples and brush extents in; they get back ID sets and edge
//! decisions out. Nothing here performs I/O or owns shared state.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`scale`] | Linear pixel/domain scales and `Point` |
//! | [`polygon`] | Even-odd point-in-polygon containment |
//! | [`lasso`] | Lasso gesture state machine |
//! | [`brush`] | Interval clamping and per-edge brush diffing |
//! | [`consts`] | Shared numeric constants (tolerances, minimum samples) |

pub mod brush;
pub mod consts;
pub mod lasso;
pub mod polygon;
pub mod scale;
