//! Rendering sync over an external chart capability.
//!
//! Charts are optional: a container that is not registered (the widget is not
//! on this view) or a backend that declines to create a chart turns every
//! call for that slot into a silent no-op.

use crate::derived::{DerivedView, SERIES_A, SERIES_B};
use normalizer::Snapshot;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Chart containers the dashboard knows how to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartSlot {
    Weekday,
    LoadSplit,
    CostComparison,
    TimeSeries,
    Sparkline,
}

impl ChartSlot {
    pub const ALL: [ChartSlot; 5] = [
        ChartSlot::Weekday,
        ChartSlot::LoadSplit,
        ChartSlot::CostComparison,
        ChartSlot::TimeSeries,
        ChartSlot::Sparkline,
    ];

    /// Container identifier.
    pub fn container(self) -> &'static str {
        match self {
            ChartSlot::Weekday => "weekday-chart",
            ChartSlot::LoadSplit => "load-split-chart",
            ChartSlot::CostComparison => "cost-chart",
            ChartSlot::TimeSeries => "series-chart",
            ChartSlot::Sparkline => "sparkline",
        }
    }

    /// Series layout for this slot.
    pub fn series_config(self) -> SeriesConfig {
        let series = |items: &[(&'static str, &'static str)]| -> Vec<SeriesSpec> {
            items
                .iter()
                .map(|&(name, y_key)| SeriesSpec { name, y_key })
                .collect()
        };
        match self {
            ChartSlot::Weekday => SeriesConfig {
                x_key: "label",
                series: series(&[(SERIES_A, "valueA"), (SERIES_B, "valueB")]),
            },
            ChartSlot::LoadSplit => SeriesConfig {
                x_key: "label",
                series: series(&[("Part A", "partA"), ("Part B", "partB")]),
            },
            ChartSlot::CostComparison => SeriesConfig {
                x_key: "bucket",
                series: series(&[(SERIES_A, "before"), (SERIES_B, "after")]),
            },
            ChartSlot::TimeSeries => SeriesConfig {
                x_key: "timestamp",
                series: series(&[
                    ("Value", "value"),
                    ("Low", "lowThreshold"),
                    ("High", "highThreshold"),
                ]),
            },
            ChartSlot::Sparkline => SeriesConfig {
                x_key: "index",
                series: series(&[("Value", "value")]),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSpec {
    pub name: &'static str,
    pub y_key: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesConfig {
    pub x_key: &'static str,
    pub series: Vec<SeriesSpec>,
}

/// A live chart.
pub trait ChartHandle: Send {
    fn replace_data(&mut self, rows: Vec<Value>);
    fn set_series_visible(&mut self, name: &str, visible: bool);
}

/// Chart capability. Returns `None` when a chart cannot be created.
pub trait ChartBackend: Send + Sync {
    fn create(
        &self,
        container: &str,
        config: &SeriesConfig,
        rows: Vec<Value>,
    ) -> Option<Box<dyn ChartHandle>>;
}

fn to_rows<T: Serialize>(items: &[T]) -> Vec<Value> {
    items
        .iter()
        .filter_map(|item| match serde_json::to_value(item) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to serialize chart row: {}", e);
                None
            }
        })
        .collect()
}

fn rows_for(slot: ChartSlot, snapshot: &Snapshot, view: &DerivedView) -> Vec<Value> {
    match slot {
        ChartSlot::Weekday => to_rows(&snapshot.weekday_series),
        ChartSlot::LoadSplit => to_rows(&snapshot.load_split),
        ChartSlot::CostComparison => to_rows(&view.cost_comparison),
        ChartSlot::TimeSeries => to_rows(&snapshot.time_series),
        ChartSlot::Sparkline => view
            .sparkline
            .iter()
            .enumerate()
            .map(|(index, value)| serde_json::json!({ "index": index, "value": value }))
            .collect(),
    }
}

/// Keeps chart handles in step with the latest snapshot and view.
pub struct RenderSync {
    backend: Arc<dyn ChartBackend>,
    containers: HashSet<ChartSlot>,
    handles: HashMap<ChartSlot, Box<dyn ChartHandle>>,
}

impl RenderSync {
    /// `containers` are the slots present on this view.
    pub fn new(
        backend: Arc<dyn ChartBackend>,
        containers: impl IntoIterator<Item = ChartSlot>,
    ) -> Self {
        Self {
            backend,
            containers: containers.into_iter().collect(),
            handles: HashMap::new(),
        }
    }

    /// Create charts for every present container that has none yet.
    pub fn mount(&mut self, snapshot: &Snapshot, view: &DerivedView) {
        for slot in ChartSlot::ALL {
            if !self.containers.contains(&slot) || self.handles.contains_key(&slot) {
                continue;
            }
            let config = slot.series_config();
            let rows = rows_for(slot, snapshot, view);
            match self.backend.create(slot.container(), &config, rows) {
                Some(handle) => {
                    self.handles.insert(slot, handle);
                }
                None => debug!("No chart created for {}", slot.container()),
            }
        }
        self.apply_visibility(view);
    }

    /// Push new data to every mounted chart.
    pub fn sync(&mut self, snapshot: &Snapshot, view: &DerivedView) {
        for slot in ChartSlot::ALL {
            if let Some(handle) = self.handle_mut(slot) {
                handle.replace_data(rows_for(slot, snapshot, view));
            }
        }
        self.apply_visibility(view);
    }

    /// Apply compare-mode visibility without touching data.
    pub fn apply_visibility(&mut self, view: &DerivedView) {
        for slot in [ChartSlot::Weekday, ChartSlot::CostComparison] {
            if let Some(handle) = self.handle_mut(slot) {
                handle.set_series_visible(SERIES_A, view.show_a);
                handle.set_series_visible(SERIES_B, view.show_b);
            }
        }
    }

    /// The container went away; later calls for it are no-ops.
    pub fn remove_container(&mut self, slot: ChartSlot) {
        self.containers.remove(&slot);
        self.handles.remove(&slot);
    }

    pub fn is_mounted(&self, slot: ChartSlot) -> bool {
        self.handles.contains_key(&slot)
    }

    fn handle_mut(&mut self, slot: ChartSlot) -> Option<&mut Box<dyn ChartHandle>> {
        if !self.containers.contains(&slot) {
            return None;
        }
        self.handles.get_mut(&slot)
    }
}

/// Backend that renders by logging.
#[derive(Debug, Default)]
pub struct LogChartBackend;

struct LogChart {
    container: String,
}

impl ChartHandle for LogChart {
    fn replace_data(&mut self, rows: Vec<Value>) {
        debug!("[{}] {} rows", self.container, rows.len());
    }

    fn set_series_visible(&mut self, name: &str, visible: bool) {
        debug!("[{}] series '{}' visible={}", self.container, name, visible);
    }
}

impl ChartBackend for LogChartBackend {
    fn create(
        &self,
        container: &str,
        config: &SeriesConfig,
        rows: Vec<Value>,
    ) -> Option<Box<dyn ChartHandle>> {
        info!(
            "[{}] chart created: x={}, {} series, {} rows",
            container,
            config.x_key,
            config.series.len(),
            rows.len()
        );
        Some(Box::new(LogChart {
            container: container.to_string(),
        }))
    }
}
