//! Stream handler trait for snapshot consumers.

use async_trait::async_trait;
use normalizer::Snapshot;

/// Trait that consumers implement to receive stream events.
/// The SseManager calls these methods when events occur.
#[async_trait]
pub trait StreamHandler: Send + Sync + 'static {
    /// Called with every delivered snapshot, already normalized.
    async fn on_snapshot(&self, snapshot: Snapshot);

    /// Called when the error indicator is raised or cleared.
    async fn on_error(&self, _is_error: bool) {}

    /// Called when the live indicator flips between live and stale.
    async fn on_live_change(&self, _live: bool) {}

    /// Called when a transport has opened.
    async fn on_open(&self) {}
}
