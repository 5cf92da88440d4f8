//! Reconnection state machine.
//!
//! `Connection` is pure: it consumes events and returns the actions the driver
//! must perform. It never touches the network or the clock, which keeps every
//! transition testable without a server.
//!
//! ```text
//!            Start/Visible              Opened
//!   Idle ───────────────→ Connecting ─────────→ Open
//!                            ↑   │                │
//!                 RetryFired │   │ TransportError │ TransportError
//!                            │   ↓                ↓
//!                           Errored ←─────────────┘
//!
//!   Connecting | Open | Errored ──Hidden──→ Suspended ──Visible──→ Connecting
//! ```

use std::time::Duration;

/// Default delay before the first reconnect.
pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_millis(1_000);
/// Default upper bound for the reconnect delay.
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_millis(15_000);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Errored,
    Suspended,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Subscriber initialized.
    Start,
    /// Transport reported open.
    Opened,
    /// Transport failed or ended.
    TransportError,
    /// Scheduled retry elapsed.
    RetryFired,
    /// Consuming view hidden.
    Hidden,
    /// Consuming view visible again.
    Visible,
    /// Subscriber is being torn down.
    Shutdown,
}

/// Side effects requested by a transition, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenTransport,
    CloseTransport,
    ScheduleRetry(Duration),
    CancelRetry,
    SetErrorIndicator(bool),
}

/// Backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub floor: Duration,
    pub ceiling: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            floor: DEFAULT_BACKOFF_FLOOR,
            ceiling: DEFAULT_BACKOFF_CEILING,
        }
    }
}

/// Client-side view of one logical subscription.
#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    bounds: Backoff,
    backoff: Duration,
    transport_live: bool,
    retry_pending: bool,
    last_open_ms: Option<i64>,
}

impl Connection {
    pub fn new(bounds: Backoff) -> Self {
        Self {
            state: ConnectionState::Idle,
            bounds,
            backoff: bounds.floor,
            transport_live: false,
            retry_pending: false,
            last_open_ms: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Delay the next scheduled retry will use.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Whether a transport is currently open or opening.
    pub fn has_live_transport(&self) -> bool {
        self.transport_live
    }

    /// Wall-clock time of the last successful open.
    pub fn last_open_ms(&self) -> Option<i64> {
        self.last_open_ms
    }

    /// Apply an event and return the resulting actions.
    /// Events that do not apply to the current state are ignored.
    pub fn handle(&mut self, event: ConnectionEvent, now_ms: i64) -> Vec<Action> {
        use ConnectionEvent::*;
        use ConnectionState::*;

        let mut actions = Vec::new();
        match (self.state, event) {
            (Idle | Suspended, Start | Visible) => {
                self.open(&mut actions);
            }
            (Idle, Hidden) => {
                self.state = Suspended;
            }
            (Connecting, Opened) => {
                self.state = Open;
                self.backoff = self.bounds.floor;
                self.last_open_ms = Some(now_ms);
                actions.push(Action::SetErrorIndicator(false));
            }
            (Connecting | Open, TransportError) => {
                self.close(&mut actions);
                self.state = Errored;
                self.retry_pending = true;
                actions.push(Action::SetErrorIndicator(true));
                actions.push(Action::ScheduleRetry(self.backoff));
            }
            (Errored, RetryFired) => {
                self.retry_pending = false;
                self.backoff = (self.backoff * 2).min(self.bounds.ceiling);
                self.open(&mut actions);
            }
            (Connecting | Open | Errored, Hidden) => {
                self.close(&mut actions);
                self.cancel_retry(&mut actions);
                self.state = Suspended;
            }
            (_, Shutdown) => {
                self.close(&mut actions);
                self.cancel_retry(&mut actions);
                self.state = Idle;
            }
            _ => {}
        }
        actions
    }

    fn open(&mut self, actions: &mut Vec<Action>) {
        // Never two live transports: close the old one first.
        self.close(actions);
        self.transport_live = true;
        self.state = ConnectionState::Connecting;
        actions.push(Action::OpenTransport);
    }

    fn close(&mut self, actions: &mut Vec<Action>) {
        if self.transport_live {
            self.transport_live = false;
            actions.push(Action::CloseTransport);
        }
    }

    fn cancel_retry(&mut self, actions: &mut Vec<Action>) {
        if self.retry_pending {
            self.retry_pending = false;
            actions.push(Action::CancelRetry);
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}
