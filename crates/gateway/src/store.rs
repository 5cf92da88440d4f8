//! Single-writer snapshot cell.
//!
//! The generator is the only writer. Each tick installs a brand-new
//! `Arc<Snapshot>`; readers clone the `Arc` and keep a consistent copy for as
//! long as they need it, so nobody observes a half-updated snapshot.

use normalizer::Snapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Holds the canonical snapshot.
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    ticks: AtomicU64,
}

impl SnapshotStore {
    /// Create a store seeded with `initial`.
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            ticks: AtomicU64::new(0),
        }
    }

    /// Read-only copy of the current snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the snapshot wholesale and return the installed copy.
    pub fn replace(&self, next: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        self.ticks.fetch_add(1, Ordering::Relaxed);
        next
    }

    /// Number of replacements since start.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readers_keep_their_copy_across_replace() {
        let store = SnapshotStore::new(normalizer::build_demo_at(1_000_000));
        let before = store.current();

        let mut next = (*before).clone();
        next.kpi.reduction_pct = 61;
        let installed = store.replace(next);

        assert_eq!(before.kpi.reduction_pct, 64);
        assert_eq!(store.current().kpi.reduction_pct, 61);
        assert!(Arc::ptr_eq(&installed, &store.current()));
        assert_eq!(store.tick_count(), 1);
    }
}
