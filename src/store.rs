use crate::snapshot::MetricsSnapshot;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Holds the currently published snapshot.
///
/// Writers build a complete record and publish it with a single pointer swap,
/// so readers always see one whole sample and never block the sampler.
pub struct SnapshotStore {
    current: ArcSwap<MetricsSnapshot>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(MetricsSnapshot::default()),
        }
    }

    /// A consistent copy of the latest snapshot.
    pub fn current(&self) -> MetricsSnapshot {
        **self.current.load()
    }

    /// The latest snapshot without copying it.
    pub fn load(&self) -> Arc<MetricsSnapshot> {
        self.current.load_full()
    }

    pub fn publish(&self, snapshot: MetricsSnapshot) {
        self.current.store(Arc::new(snapshot));
    }
}
