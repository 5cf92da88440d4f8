//! Client-side subscriber for the live telemetry stream.
//!
//! ## Architecture
//!
//! ```text
//! ControlCommand (Hidden / Visible / Shutdown)
//!         ↓
//! SseManager ── actions ──← Connection (pure state machine)
//!         ↓ bytes
//! SseDecoder → envelope → normalizer::normalize
//!         ↓
//! StreamHandler (on_snapshot, on_error, on_live_change)
//! ```
//!
//! `fetch_or_demo` covers first paint before the stream delivers anything.

pub mod connection;
pub mod error;
pub mod handler;
pub mod live;
pub mod messages;
pub mod snapshot;
pub mod sse;
pub mod sse_manager;

pub use connection::{Action, Backoff, Connection, ConnectionEvent, ConnectionState};
pub use error::{Error, Result};
pub use handler::StreamHandler;
pub use live::{LiveIndicator, LiveStatus};
pub use messages::ControlCommand;
pub use snapshot::{fetch_or_demo, fetch_snapshot};
pub use sse_manager::{SseManager, SubscriberConfig};
