//! What a view is handed when it mounts.
//!
//! A [`ViewContext`] pairs the shared [`Session`] with the in-process
//! [`EventBus`]. It is not `Send`: the bus delivers on the UI thread, so
//! contexts live on a single-threaded runtime or a `LocalSet`.

#[cfg(test)]
#[path = "context_test.rs"]
mod context_test;

use gesture::lasso::{LassoGesture, Mark};
use gesture::scale::LinearScale;
use tracing::{debug, info};

use crate::bus::EventBus;
use crate::model::{EntityId, ProjectionMethod, TimeRange};
use crate::selection::EntitySelectionChange;
use crate::session::{Session, SessionError};
use crate::snapshot::Snapshot;

#[derive(Clone)]
pub struct ViewContext {
    session: Session,
    bus: EventBus,
}

impl ViewContext {
    #[must_use]
    pub fn new(session: Session, bus: EventBus) -> Self {
        Self { session, bus }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.session.snapshot().await
    }

    /// Pointer-up on a lasso: select whatever the path encloses.
    ///
    /// Returns `None` if no gesture was in progress. Enclosing nothing clears
    /// the selection without contacting the backend.
    ///
    /// # Errors
    ///
    /// Returns the rescoring failure for a non-empty selection.
    pub async fn lasso_select(
        &self,
        gesture: &mut LassoGesture,
        marks: &[Mark<EntityId>],
    ) -> Result<Option<EntitySelectionChange>, SessionError> {
        let Some(selection) = gesture.finish(marks) else {
            return Ok(None);
        };
        debug!(enclosed = selection.len(), "lasso finished");
        let change = self.session.select_entities(selection.ids).await?;
        Ok(Some(change))
    }

    pub async fn hover(&self, id: Option<EntityId>) -> bool {
        self.session.set_hovered_entity(id).await
    }

    /// Adopt `range` as the shared window and tell every time-axis view.
    /// Returns how many subscribers were notified.
    pub async fn publish_time_domain(&self, range: TimeRange) -> usize {
        self.session.set_time_range(Some(range)).await;
        let notified = self.bus.time_domain().publish(&range);
        info!(start = range.start, end = range.end, notified, "time domain changed");
        notified
    }
}

/// Lasso marks for the projection view, in pixels.
///
/// Points without coordinates for `method` are left out.
#[must_use]
pub fn projection_marks(snapshot: &Snapshot, method: ProjectionMethod, x: &LinearScale, y: &LinearScale) -> Vec<Mark<EntityId>> {
    snapshot
        .projection
        .iter()
        .filter_map(|p| {
            let (px, py) = p.coordinates(method)?;
            Some(Mark::new(p.entity_id.clone(), x.apply(px), y.apply(py)))
        })
        .collect()
}
