//! Per-endpoint snapshot store
//!
//! The visible snapshot is an `Arc` behind an [`ArcSwapOption`]. Publishing
//! swaps the pointer in one step, so a reader holds either the old or the
//! new snapshot, never a mix. Readers never wait on the writer.

use arc_swap::ArcSwapOption;
use scrape_core::Snapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// What a reader sees
#[derive(Debug, Clone)]
pub enum SnapshotView {
    /// No cycle has completed yet
    NotYetCollected,

    /// The latest published snapshot
    Ready(Arc<Snapshot>),
}

impl SnapshotView {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            SnapshotView::NotYetCollected => None,
            SnapshotView::Ready(snapshot) => Some(snapshot),
        }
    }
}

/// Latest published snapshot of one endpoint
#[derive(Debug)]
pub struct SnapshotStore {
    endpoint: String,
    current: ArcSwapOption<Snapshot>,
    generation: AtomicU64,
}

impl SnapshotStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            current: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Replace the visible snapshot and return its generation
    pub fn publish(&self, snapshot: Snapshot) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(snapshot.with_generation(generation));
        debug!(
            "Publishing snapshot {} for endpoint {} ({} measurements, up={})",
            generation,
            self.endpoint,
            snapshot.measurements().len(),
            snapshot.is_up()
        );
        self.current.store(Some(snapshot));
        generation
    }

    /// Current snapshot, or the not-yet-collected sentinel
    pub fn read(&self) -> SnapshotView {
        match self.current.load_full() {
            Some(snapshot) => SnapshotView::Ready(snapshot),
            None => SnapshotView::NotYetCollected,
        }
    }

    /// Number of snapshots published so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
