//! Telemetry snapshot schema and normalization.
//!
//! Both ends of the pipeline depend on this crate: the gateway uses the
//! schema and demo seed for its generator, and dashboards use the normalizer
//! to turn whatever arrived over the wire into a render-safe snapshot.
//!
//! # Architecture
//!
//! ```text
//! Raw payload (HTTP / SSE) --> fill::normalize --> Snapshot
//!                                 ^
//!                                 | per-field defaults
//!                           demo::build_demo
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use normalizer::normalize_str;
//!
//! let snapshot = normalize_str(&body);
//! assert_eq!(snapshot.weekday_series.len(), 5);
//! ```

pub mod demo;
pub mod fill;
pub mod schema;

// Re-export core types
pub use demo::{build_demo, build_demo_at};
pub use fill::{normalize, normalize_str, normalize_with};
pub use schema::{
    CostRow, Kpi, LoadSplitRow, ShapeViolation, Snapshot, TimePoint, WeekdayRow,
    DEFAULT_SERIES_RETENTION,
};
