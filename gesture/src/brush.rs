//! Two-axis rectangular brush arithmetic.
//!
//! A brush region lives in data space: a time interval on the x axis and a
//! value interval on the y axis. Two directions matter:
//!
//! - **Drawing** a stored region onto a chart whose visible domain may not
//!   contain it: each edge is clamped to the visible domain independently.
//!   An edge outside snaps to the nearest visible boundary; an edge inside is
//!   used as-is. A clamp that would invert the rectangle is reported, never
//!   corrected.
//! - **Committing** a brush gesture: the brush reports all four edges even
//!   when the user dragged one. Each edge is compared on its own against the
//!   committed value (and against the value that was drawn, which differs
//!   when the edge was clamped), and only edges that actually moved adopt the
//!   gesture's value.

#[cfg(test)]
#[path = "brush_test.rs"]
mod brush_test;

use serde::{Deserialize, Serialize};

use crate::consts::{VALUE_EDGE_EPSILON, VALUE_EDGE_RELATIVE_EPSILON};
use crate::scale::LinearScale;

/// Closed interval `[lo, hi]` in data space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    #[must_use]
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Same interval with `lo <= hi`.
    #[must_use]
    pub fn normalized(self) -> Self {
        if self.lo <= self.hi { self } else { Self { lo: self.hi, hi: self.lo } }
    }

    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.lo > self.hi
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    #[must_use]
    pub fn contains(&self, v: f64) -> bool {
        v >= self.lo && v <= self.hi
    }
}

/// A brush region: time on x, value on y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub time: Interval,
    pub value: Interval,
}

impl Rect {
    #[must_use]
    pub fn new(time: Interval, value: Interval) -> Self {
        Self { time, value }
    }
}

/// Brush selection in pixels, as reported by the chart: `(x0, y0)` is the
/// top-left corner and `(x1, y1)` the bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl PixelRect {
    #[must_use]
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

/// Which of the four edges a commit changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFlags {
    pub t0: bool,
    pub t1: bool,
    pub v0: bool,
    pub v1: bool,
}

impl EdgeFlags {
    #[must_use]
    pub fn any(&self) -> bool {
        self.t0 || self.t1 || self.v0 || self.v1
    }

    #[must_use]
    pub fn count(&self) -> usize {
        [self.t0, self.t1, self.v0, self.v1].into_iter().filter(|f| *f).count()
    }
}

/// How two edge positions are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tolerance {
    /// Bitwise-equal values only. Used for time edges, which callers round to
    /// whole milliseconds before comparing.
    Exact,
    /// Within `max(VALUE_EDGE_EPSILON, |a| * VALUE_EDGE_RELATIVE_EPSILON)`.
    Epsilon,
}

impl Tolerance {
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn same(self, a: f64, b: f64) -> bool {
        match self {
            Tolerance::Exact => a == b,
            Tolerance::Epsilon => {
                let eps = VALUE_EDGE_EPSILON.max(a.abs() * VALUE_EDGE_RELATIVE_EPSILON);
                (a - b).abs() <= eps
            }
        }
    }
}

/// Axis on which a clamp inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    Time,
    Value,
}

/// Result of clamping a stored region into a visible domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Clamped {
    /// Draw this rectangle.
    Visible(Rect),
    /// Clamping produced `lo > hi` on `axis`; do not draw.
    Inverted { axis: Axis },
}

/// Snap `v` into `[domain.lo, domain.hi]`.
#[must_use]
pub fn clamp_edge(v: f64, domain: Interval) -> f64 {
    let d = domain.normalized();
    if v < d.lo {
        d.lo
    } else if v > d.hi {
        d.hi
    } else {
        v
    }
}

/// Clamp both edges of `iv` into `domain`, or `None` if the result inverts.
#[must_use]
pub fn clamp_interval(iv: Interval, domain: Interval) -> Option<Interval> {
    let out = Interval::new(clamp_edge(iv.lo, domain), clamp_edge(iv.hi, domain));
    if out.is_inverted() { None } else { Some(out) }
}

/// Clamp a stored region into the chart's visible domains.
#[must_use]
pub fn clamp_rect(region: Rect, visible_time: Interval, visible_value: Interval) -> Clamped {
    let Some(time) = clamp_interval(region.time, visible_time) else {
        return Clamped::Inverted { axis: Axis::Time };
    };
    let Some(value) = clamp_interval(region.value, visible_value) else {
        return Clamped::Inverted { axis: Axis::Value };
    };
    Clamped::Visible(Rect::new(time, value))
}

/// Invert a pixel brush through the chart scales into data space.
///
/// The value axis is flipped on screen, so the bottom pixel edge `y1` is the
/// low value and the top edge `y0` the high one.
#[must_use]
pub fn rect_from_pixels(px: PixelRect, x: &LinearScale, y: &LinearScale) -> Rect {
    let time = Interval::new(x.invert(px.x0), x.invert(px.x1)).normalized();
    let value = Interval::new(y.invert(px.y1), y.invert(px.y0)).normalized();
    Rect::new(time, value)
}

/// Project a data-space rectangle onto the chart in pixels.
#[must_use]
pub fn rect_to_pixels(r: Rect, x: &LinearScale, y: &LinearScale) -> PixelRect {
    let (x0, x1) = (x.apply(r.time.lo), x.apply(r.time.hi));
    let (ya, yb) = (y.apply(r.value.hi), y.apply(r.value.lo));
    PixelRect::new(x0.min(x1), ya.min(yb), x0.max(x1), ya.max(yb))
}

/// Outcome of folding a gesture into a committed region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeMerge {
    pub region: Rect,
    pub changed: EdgeFlags,
}

fn pick(committed: f64, drawn: Option<f64>, proposed: f64, tol: Tolerance) -> (f64, bool) {
    let unchanged = tol.same(committed, proposed) || drawn.is_some_and(|d| tol.same(d, proposed));
    if unchanged { (committed, false) } else { (proposed, true) }
}

/// Fold `proposed` into `committed` edge by edge.
///
/// `drawn` is the rectangle last placed on the chart, if any; an edge the
/// gesture left at its drawn position is unchanged even when the drawn edge
/// was clamped away from the committed one.
#[must_use]
pub fn merge_edges(
    committed: Rect,
    drawn: Option<Rect>,
    proposed: Rect,
    time_tol: Tolerance,
    value_tol: Tolerance,
) -> EdgeMerge {
    let (t0, c_t0) = pick(committed.time.lo, drawn.map(|d| d.time.lo), proposed.time.lo, time_tol);
    let (t1, c_t1) = pick(committed.time.hi, drawn.map(|d| d.time.hi), proposed.time.hi, time_tol);
    let (v0, c_v0) = pick(committed.value.lo, drawn.map(|d| d.value.lo), proposed.value.lo, value_tol);
    let (v1, c_v1) = pick(committed.value.hi, drawn.map(|d| d.value.hi), proposed.value.hi, value_tol);
    EdgeMerge {
        region: Rect::new(Interval::new(t0, t1).normalized(), Interval::new(v0, v1).normalized()),
        changed: EdgeFlags { t0: c_t0, t1: c_t1, v0: c_v0, v1: c_v1 },
    }
}
