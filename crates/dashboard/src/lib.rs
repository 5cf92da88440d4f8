//! Telemetry dashboard client.
//!
//! ```text
//! subscriber::SseManager ──→ Dashboard (StreamHandler)
//!                               ↓
//!                 DerivedView::compute(snapshot, controls)
//!                               ↓
//!                 RenderSync ──→ ChartBackend / ChartHandle
//! ```
//!
//! The latest snapshot is kept unscaled; every view is derived from it and the
//! current controls, so repeated control changes never compound.

pub mod app;
pub mod config;
pub mod derived;
pub mod error;
pub mod render;

pub use app::{Dashboard, LinkColor};
pub use config::DashboardConfig;
pub use derived::{CompareMode, Controls, DerivedView, BASE_PRICE};
pub use error::{DashboardError, Result};
pub use render::{ChartBackend, ChartHandle, ChartSlot, LogChartBackend, RenderSync};
