//! Gateway service for the live telemetry stream.
//!
//! This service:
//! - Owns the canonical telemetry snapshot and advances it on a fixed tick
//! - Serves the current snapshot for first paint
//! - Pushes the full snapshot to every connected Server-Sent Events client
//!
//! ## Architecture
//!
//! ```text
//! Generator (single writer, fixed tick)
//!         ↓ replace Arc<Snapshot>
//! SnapshotStore ──→ GET /api/telemetry/snapshot
//!         ↓ serialize once
//! ClientRegistry (DashMap, bounded channels)
//!         ↓
//! GET /api/telemetry/stream (one SSE response per client)
//! ```
//!
//! ## Design
//!
//! - One generator regardless of client count; fan-out is a channel send
//! - Snapshots are replaced wholesale, never mutated in place
//! - A dropped response body unregisters its client
//! - Shutdown closes every client channel so open streams end and the server drains

pub mod client;
pub mod config;
pub mod error;
pub mod generator;
pub mod protocol;
pub mod sse_server;
pub mod store;

pub use client::{ClientId, ClientRegistry, ClientState};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use generator::Generator;
pub use protocol::{HealthResponse, StreamMessage};
pub use sse_server::{create_router, serve, AppState, SNAPSHOT_PATH, STREAM_PATH};
pub use store::SnapshotStore;
