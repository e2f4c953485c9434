//! Point-in-polygon containment for free-form selections.
//!
//! The polygon is the raw sequence of pointer samples; the closing edge from
//! the last vertex back to the first is implicit. Containment follows the
//! even-odd rule via horizontal ray casting, so self-intersecting lasso paths
//! select the regions a user would expect from a filled SVG path.

#[cfg(test)]
#[path = "polygon_test.rs"]
mod polygon_test;

use crate::consts::LASSO_MIN_VERTICES;
use crate::scale::Point;

/// Even-odd ray-casting test of `pt` against the closed polygon `vertices`.
///
/// Polygons with fewer than three vertices enclose nothing.
#[must_use]
pub fn contains(vertices: &[Point], pt: Point) -> bool {
    if vertices.len() < LASSO_MIN_VERTICES {
        return false;
    }
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let a = vertices[i];
        let b = vertices[j];
        if (a.y > pt.y) != (b.y > pt.y) {
            let cross_x = (b.x - a.x) * (pt.y - a.y) / (b.y - a.y) + a.x;
            if pt.x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// A closed polygon with a cached bounding box.
///
/// Marks outside the box are rejected without walking the edges, which keeps
/// selection over a few thousand scatter marks cheap for compact lassos.
#[derive(Debug, Clone)]
pub struct Polygon {
    vertices: Vec<Point>,
    min: Point,
    max: Point,
}

impl Polygon {
    #[must_use]
    pub fn new(vertices: Vec<Point>) -> Self {
        let mut min = Point::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for v in &vertices {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
        }
        Self { vertices, min, max }
    }

    #[must_use]
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Whether the polygon has enough vertices to enclose anything.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.vertices.len() < LASSO_MIN_VERTICES
    }

    #[must_use]
    pub fn contains(&self, pt: Point) -> bool {
        if self.is_degenerate() {
            return false;
        }
        if pt.x < self.min.x || pt.x > self.max.x || pt.y < self.min.y || pt.y > self.max.y {
            return false;
        }
        contains(&self.vertices, pt)
    }
}
