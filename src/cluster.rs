//! Cluster assignments and recompute debouncing.
//!
//! DESIGN
//! ======
//! Cluster parameters come from sliders, which emit a value per pixel of
//! travel. Only the value the user settles on is worth a backend round trip,
//! so updates pass through a trailing-edge [`Debouncer`]: each update restarts
//! the quiet period, and one request goes out when it elapses (or when the
//! host signals the gesture ended).
//!
//! ERROR HANDLING
//! ==============
//! A failed recompute leaves the existing assignments, projection, and
//! contributions untouched; the failure is logged and surfaced on the session
//! snapshot. Nothing is applied partially.

#[cfg(test)]
#[path = "cluster_test.rs"]
mod cluster_test;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::model::{ClusterId, EntityId};
use crate::session::Session;

// =============================================================================
// CLUSTER MAP
// =============================================================================

/// Entity → cluster label, total over the loaded entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMap {
    assignments: BTreeMap<EntityId, ClusterId>,
}

impl ClusterMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<ClusterId> {
        self.assignments.get(id).copied()
    }

    /// Distinct cluster labels in ascending order.
    #[must_use]
    pub fn clusters(&self) -> BTreeSet<ClusterId> {
        self.assignments.values().copied().collect()
    }

    /// Entities assigned to `cluster`.
    pub fn members(&self, cluster: ClusterId) -> impl Iterator<Item = &EntityId> {
        self.assignments
            .iter()
            .filter(move |(_, c)| **c == cluster)
            .map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, ClusterId)> {
        self.assignments.iter().map(|(id, c)| (id, *c))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl FromIterator<(EntityId, ClusterId)> for ClusterMap {
    fn from_iter<I: IntoIterator<Item = (EntityId, ClusterId)>>(iter: I) -> Self {
        Self { assignments: iter.into_iter().collect() }
    }
}

// =============================================================================
// PARAMETERS
// =============================================================================

/// Embedding and clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    pub n_neighbors: u32,
    pub min_dist: f64,
    pub num_clusters: u32,
}

/// One debounced recompute request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterRequest {
    pub params: ClusterParams,
    /// Recompute the embedding too, not just the clustering.
    pub force: bool,
}

// =============================================================================
// DEBOUNCER
// =============================================================================

/// Trailing-edge debouncer driven by explicit instants.
///
/// Pure state: callers supply `now`, which keeps it usable from both the
/// async orchestrator and synchronous tests.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    #[must_use]
    pub fn new(quiet: Duration) -> Self {
        Self { quiet, pending: None }
    }

    /// Record a new value; replaces any pending one and restarts the quiet period.
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    /// When the pending value becomes due, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at + self.quiet)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the pending value if its quiet period has elapsed by `now`.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.flush(),
            _ => None,
        }
    }

    /// Take the pending value immediately.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

enum Command {
    Update(ClusterRequest),
    Flush,
}

/// Debounces parameter updates into single recompute calls on a [`Session`].
pub struct ClusterOrchestrator {
    tx: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

impl ClusterOrchestrator {
    /// Spawn the debounce loop on the current tokio runtime.
    #[must_use]
    pub fn spawn(session: Session, quiet: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        info!(quiet_ms = quiet.as_millis(), "cluster orchestrator started");
        let handle = tokio::spawn(run(session, rx, quiet));
        Self { tx, handle }
    }

    /// Queue new parameters. Returns `false` if the loop has stopped.
    pub fn update_parameters(&self, n_neighbors: u32, min_dist: f64, num_clusters: u32, force: bool) -> bool {
        let params = ClusterParams { n_neighbors, min_dist, num_clusters };
        self.send(Command::Update(ClusterRequest { params, force }))
    }

    /// Gesture ended: send the pending request now instead of waiting.
    pub fn flush(&self) -> bool {
        self.send(Command::Flush)
    }

    /// Stop accepting updates, send anything pending, and wait for the loop.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "cluster orchestrator task ended abnormally");
        }
    }

    fn send(&self, cmd: Command) -> bool {
        if self.tx.send(cmd).is_err() {
            warn!("cluster orchestrator stopped; update dropped");
            return false;
        }
        true
    }
}

async fn run(session: Session, mut rx: mpsc::UnboundedReceiver<Command>, quiet: Duration) {
    let mut debouncer = Debouncer::new(quiet);
    loop {
        let cmd = match debouncer.deadline() {
            Some(deadline) => {
                tokio::select! {
                    cmd = rx.recv() => cmd,
                    () = tokio::time::sleep_until(deadline) => {
                        if let Some(req) = debouncer.poll(Instant::now()) {
                            dispatch(&session, req).await;
                        }
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };
        match cmd {
            Some(Command::Update(req)) => {
                debug!(?req, "cluster parameters updated");
                debouncer.push(req, Instant::now());
            }
            Some(Command::Flush) => {
                if let Some(req) = debouncer.flush() {
                    dispatch(&session, req).await;
                }
            }
            None => {
                if let Some(req) = debouncer.flush() {
                    dispatch(&session, req).await;
                }
                break;
            }
        }
    }
}

async fn dispatch(session: &Session, req: ClusterRequest) {
    info!(
        n_neighbors = req.params.n_neighbors,
        min_dist = req.params.min_dist,
        num_clusters = req.params.num_clusters,
        force = req.force,
        "debounce elapsed; recomputing clusters"
    );
    if let Err(e) = session.recompute_clusters(req).await {
        warn!(error = %e, "cluster recompute failed; keeping previous assignments");
    }
}
