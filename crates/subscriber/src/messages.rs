//! Control messages for a running stream subscriber.

/// Commands that can be sent to an SseManager at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// The consuming view went to the background; close the transport.
    Hidden,
    /// The consuming view is in the foreground again; reconnect.
    Visible,
    /// Graceful shutdown
    Shutdown,
}
