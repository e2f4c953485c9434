//! Lasso gesture: pointer samples in, one ID set out.
//!
//! A lasso runs from pointer-down to pointer-up. Every intermediate sample
//! only grows the preview path the host draws; containment is evaluated once,
//! on release, against the marks the host supplies at that moment. Releasing
//! around nothing is a real result (an empty set), which hosts must treat as
//! "clear the selection" rather than "ignore".

#[cfg(test)]
#[path = "lasso_test.rs"]
mod lasso_test;

use std::collections::BTreeSet;

use crate::polygon::Polygon;
use crate::scale::Point;

/// A selectable mark on screen: an identifier and its pixel position.
#[derive(Debug, Clone, PartialEq)]
pub struct Mark<K> {
    pub id: K,
    pub position: Point,
}

impl<K> Mark<K> {
    #[must_use]
    pub fn new(id: K, x: f64, y: f64) -> Self {
        Self { id, position: Point::new(x, y) }
    }
}

/// Gesture state between pointer-down and pointer-up.
#[derive(Debug, Clone, Default)]
pub enum LassoState {
    /// No gesture in progress.
    #[default]
    Idle,
    /// Pointer is down; `path` holds every sample so far, in order.
    Drawing { path: Vec<Point> },
}

/// Final result of one lasso gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LassoSelection<K: Ord> {
    /// IDs of every mark strictly inside the closed path, deduplicated.
    pub ids: BTreeSet<K>,
}

impl<K: Ord> LassoSelection<K> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Lasso state machine for a single view.
#[derive(Debug, Clone, Default)]
pub struct LassoGesture {
    state: LassoState,
}

impl LassoGesture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer-down: start a fresh path at `pt`, discarding any unfinished one.
    pub fn begin(&mut self, pt: Point) {
        self.state = LassoState::Drawing { path: vec![pt] };
    }

    /// Pointer-move: append a sample and return the preview path.
    ///
    /// Samples arriving while idle are ignored.
    pub fn extend(&mut self, pt: Point) -> &[Point] {
        if let LassoState::Drawing { path } = &mut self.state {
            path.push(pt);
        }
        self.preview()
    }

    /// The path drawn so far, empty when idle.
    #[must_use]
    pub fn preview(&self) -> &[Point] {
        match &self.state {
            LassoState::Idle => &[],
            LassoState::Drawing { path } => path,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, LassoState::Drawing { .. })
    }

    /// Abort the gesture without producing a selection.
    pub fn cancel(&mut self) {
        self.state = LassoState::Idle;
    }

    /// Pointer-up: close the path and select the enclosed marks.
    ///
    /// Returns `None` only when no gesture was in progress. A gesture that
    /// encloses nothing returns `Some` with an empty set.
    pub fn finish<'a, K, I>(&mut self, marks: I) -> Option<LassoSelection<K>>
    where
        K: Ord + Clone + 'a,
        I: IntoIterator<Item = &'a Mark<K>>,
    {
        let LassoState::Drawing { path } = std::mem::take(&mut self.state) else {
            return None;
        };
        Some(select_enclosed(path, marks))
    }
}

/// Select every mark inside the closed polygon traced by `path`.
pub fn select_enclosed<'a, K, I>(path: Vec<Point>, marks: I) -> LassoSelection<K>
where
    K: Ord + Clone + 'a,
    I: IntoIterator<Item = &'a Mark<K>>,
{
    let polygon = Polygon::new(path);
    let ids = marks
        .into_iter()
        .filter(|m| polygon.contains(m.position))
        .map(|m| m.id.clone())
        .collect();
    LassoSelection { ids }
}
