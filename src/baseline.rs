//! Baseline editor: per-feature reference windows edited with a 2D brush.
//!
//! DESIGN
//! ======
//! Each feature chart owns its own zoomed scales, so the stored region and
//! what is on screen can differ. Two paths connect them:
//!
//! - [`BaselineEditor::place`] draws the stored region: edges are clamped
//!   into the chart's visible domains, and the clamped rectangle is recorded
//!   as "drawn". Placing moves the brush programmatically, which makes the
//!   chart emit one end event of its own; the editor swallows it.
//! - [`BaselineEditor::commit_brush`] folds a user gesture back in. The brush
//!   always reports four edges, so each edge is compared with both the
//!   committed and the drawn value and only edges that actually moved are
//!   adopted. Time edges are compared in whole milliseconds, value edges
//!   within a tolerance.
//!
//! A clamp that would invert the rectangle hides the brush and leaves the
//! stored region alone.

#[cfg(test)]
#[path = "baseline_test.rs"]
mod baseline_test;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use gesture::brush::{
    self, Axis, Clamped, EdgeFlags, Interval, PixelRect, Rect, Tolerance, clamp_rect, merge_edges,
};
use gesture::scale::LinearScale;
use tracing::{debug, info};

use crate::merge::upsert_baseline;
use crate::model::{BaselineRecord, FeatureKey, Region};

// =============================================================================
// TYPES
// =============================================================================

/// A feature chart's current scales. The time scale's domain is epoch ms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartScales {
    pub time: LinearScale,
    pub value: LinearScale,
}

impl ChartScales {
    #[must_use]
    pub fn new(time: LinearScale, value: LinearScale) -> Self {
        Self { time, value }
    }

    #[must_use]
    pub fn visible_time(&self) -> Interval {
        Interval::new(self.time.domain_min(), self.time.domain_max())
    }

    #[must_use]
    pub fn visible_value(&self) -> Interval {
        Interval::new(self.value.domain_min(), self.value.domain_max())
    }
}

/// Why no brush is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenReason {
    /// No baseline has been received for this feature yet.
    NoBaseline,
    /// Clamping into the visible domain inverted this axis.
    Inverted(Axis),
}

/// What a chart should do with its brush.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BrushPlacement {
    Drawn(PixelRect),
    Hidden(HiddenReason),
}

/// A committed change to one feature's baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineEdit {
    pub feature: FeatureKey,
    pub region: Region,
    pub changed: EdgeFlags,
}

// =============================================================================
// EDITOR
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct BaselineEditor {
    records: Arc<Vec<BaselineRecord>>,
    drawn: BTreeMap<FeatureKey, Rect>,
    echo_pending: BTreeSet<FeatureKey>,
}

impl BaselineEditor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> &[BaselineRecord] {
        &self.records
    }

    /// Shared handle for snapshots; later edits copy on write.
    #[must_use]
    pub fn shared(&self) -> Arc<Vec<BaselineRecord>> {
        Arc::clone(&self.records)
    }

    #[must_use]
    pub fn region(&self, feature: &FeatureKey) -> Option<Region> {
        self.records.iter().find(|r| &r.feature == feature).map(|r| r.region)
    }

    /// Upsert records from a feature-scoped response.
    pub fn seed(&mut self, records: Vec<BaselineRecord>) {
        let list = Arc::make_mut(&mut self.records);
        for record in records {
            upsert_baseline(list, record);
        }
    }

    /// Replace the records of `features` with `records`; every other
    /// feature's record is kept.
    ///
    /// A listed feature absent from `records` loses its baseline. Drawn state
    /// for the listed features is dropped; their charts re-place on the next
    /// render.
    pub fn replace_features(&mut self, features: &[&FeatureKey], records: Vec<BaselineRecord>) {
        let list = Arc::make_mut(&mut self.records);
        list.retain(|r| !features.contains(&&r.feature));
        for record in records {
            upsert_baseline(list, record);
        }
        for feature in features {
            self.detach(feature);
        }
    }

    /// Forget everything, e.g. on dataset switch.
    pub fn clear(&mut self) {
        self.records = Arc::default();
        self.drawn.clear();
        self.echo_pending.clear();
    }

    /// The chart for `feature` went away.
    pub fn detach(&mut self, feature: &FeatureKey) {
        self.drawn.remove(feature);
        self.echo_pending.remove(feature);
    }

    /// Compute where `feature`'s brush goes on a chart with `scales`.
    ///
    /// A `Drawn` result that differs from what the chart already shows arms
    /// the echo guard: the next end event for this feature is treated as the
    /// chart's own and ignored. Re-placing an unchanged brush arms nothing, so
    /// the host must only move the brush when the drawn rectangle changes.
    pub fn place(&mut self, feature: &FeatureKey, scales: &ChartScales) -> BrushPlacement {
        let Some(region) = self.region(feature) else {
            self.detach(feature);
            return BrushPlacement::Hidden(HiddenReason::NoBaseline);
        };
        match clamp_rect(region.to_rect(), scales.visible_time(), scales.visible_value()) {
            Clamped::Inverted { axis } => {
                debug!(%feature, ?axis, "baseline clamp inverted; hiding brush");
                self.detach(feature);
                BrushPlacement::Hidden(HiddenReason::Inverted(axis))
            }
            Clamped::Visible(rect) => {
                let drawn = Region::from_rect(rect).to_rect();
                if self.drawn.insert(feature.clone(), drawn) != Some(drawn) {
                    self.echo_pending.insert(feature.clone());
                }
                BrushPlacement::Drawn(brush::rect_to_pixels(drawn, &scales.time, &scales.value))
            }
        }
    }

    /// Fold a brush-end gesture into `feature`'s baseline.
    ///
    /// Returns the edit when at least one edge changed; `None` for the
    /// programmatic echo of [`Self::place`] and for gestures that moved
    /// nothing.
    pub fn commit_brush(&mut self, feature: &FeatureKey, selection: PixelRect, scales: &ChartScales) -> Option<BaselineEdit> {
        if self.echo_pending.remove(feature) {
            debug!(%feature, "ignoring programmatic brush echo");
            return None;
        }

        let proposed =
            Region::from_rect(brush::rect_from_pixels(selection, &scales.time, &scales.value)).to_rect();

        let (region, changed) = match self.region(feature) {
            Some(committed) => {
                let merged = merge_edges(
                    committed.to_rect(),
                    self.drawn.get(feature).copied(),
                    proposed,
                    Tolerance::Exact,
                    Tolerance::Epsilon,
                );
                (Region::from_rect(merged.region), merged.changed)
            }
            None => (Region::from_rect(proposed), EdgeFlags { t0: true, t1: true, v0: true, v1: true }),
        };

        self.drawn.insert(feature.clone(), proposed);
        if !changed.any() {
            return None;
        }

        upsert_baseline(Arc::make_mut(&mut self.records), BaselineRecord { feature: feature.clone(), region });
        info!(
            %feature,
            t0 = changed.t0,
            t1 = changed.t1,
            v0 = changed.v0,
            v1 = changed.v1,
            start = region.time.start,
            end = region.time.end,
            "baseline edited"
        );
        Some(BaselineEdit { feature: feature.clone(), region, changed })
    }
}
