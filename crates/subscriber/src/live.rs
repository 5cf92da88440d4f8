//! Live indicator: "live" while messages keep arriving, "stale" once none has
//! arrived for the staleness window.
//!
//! This is the only staleness detector on the client. The driver arms a timer
//! at [`LiveIndicator::deadline`] and calls [`LiveIndicator::expire`] when it
//! fires.

use std::time::Duration;
use tokio::time::Instant;

/// Default staleness window.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    Live,
    Stale,
}

#[derive(Debug)]
pub struct LiveIndicator {
    window: Duration,
    last_message: Option<Instant>,
    status: LiveStatus,
}

impl LiveIndicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_message: None,
            status: LiveStatus::Stale,
        }
    }

    pub fn status(&self) -> LiveStatus {
        self.status
    }

    /// Record a delivered message. Returns true if the status changed.
    pub fn mark(&mut self, now: Instant) -> bool {
        self.last_message = Some(now);
        self.set(LiveStatus::Live)
    }

    /// Re-evaluate at `now`. Returns true if the status changed.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.set(LiveStatus::Stale),
            _ => false,
        }
    }

    /// When the indicator goes stale if no message arrives. `None` while stale.
    pub fn deadline(&self) -> Option<Instant> {
        match (self.status, self.last_message) {
            (LiveStatus::Live, Some(last)) => Some(last + self.window),
            _ => None,
        }
    }

    fn set(&mut self, status: LiveStatus) -> bool {
        let changed = self.status != status;
        self.status = status;
        changed
    }
}

impl Default for LiveIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_goes_stale_after_window() {
        let mut live = LiveIndicator::default();
        assert_eq!(live.status(), LiveStatus::Stale);
        assert!(live.deadline().is_none());

        assert!(live.mark(Instant::now()));
        assert_eq!(live.status(), LiveStatus::Live);

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert!(!live.expire(Instant::now()));
        assert_eq!(live.status(), LiveStatus::Live);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(live.expire(Instant::now()));
        assert_eq!(live.status(), LiveStatus::Stale);
        assert!(live.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_message_extends_window() {
        let mut live = LiveIndicator::default();
        live.mark(Instant::now());

        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(1_200)).await;
            assert!(!live.mark(Instant::now()));
        }

        tokio::time::advance(Duration::from_millis(4_000)).await;
        assert!(!live.expire(Instant::now()));
        assert_eq!(live.status(), LiveStatus::Live);
    }
}
