//! Telemetry snapshot schema definitions.
//!
//! Wire names are camelCase so browser dashboards and Rust consumers share
//! one JSON shape.

use serde::{Deserialize, Serialize};

/// Weekday labels in display order.
pub const WEEKDAY_LABELS: [&str; 5] = ["Mon", "Tue", "Wed", "Thu", "Fri"];

/// Number of rows in the load split chart.
pub const LOAD_SPLIT_ROWS: usize = 2;

/// Total share a load split row must sum to.
pub const LOAD_SPLIT_TOTAL: f64 = 100.0;

/// Default maximum number of retained time-series points.
pub const DEFAULT_SERIES_RETENTION: usize = 120;

/// Default low threshold for time-series points.
pub const DEFAULT_LOW_THRESHOLD: f64 = 73.0;

/// Default high threshold for time-series points.
pub const DEFAULT_HIGH_THRESHOLD: f64 = 79.0;

/// Lower clamp for time-series values.
pub const SERIES_VALUE_MIN: f64 = 69.0;

/// Upper clamp for time-series values.
pub const SERIES_VALUE_MAX: f64 = 81.0;

/// Headline scalar metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    /// Overnight load reduction, in percent.
    pub reduction_pct: u32,
    /// Payback period label (e.g. "< 4 mo").
    pub payback_label: String,
    /// Days of locally retained logs.
    pub log_retention_days: u32,
    /// Number of devices the deployment scales to.
    pub device_scale: u32,
}

impl Kpi {
    /// Display strings for the four KPI tiles, in tile order.
    pub fn display(&self) -> [String; 4] {
        [
            format!("{}%", self.reduction_pct),
            self.payback_label.clone(),
            format!("{} days", self.log_retention_days),
            self.device_scale.to_string(),
        ]
    }
}

/// One weekday comparison row (A = baseline, B = comparison).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeekdayRow {
    pub label: String,
    pub value_a: f64,
    pub value_b: f64,
}

/// One share-of-total row; `part_a + part_b == 100`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadSplitRow {
    pub label: String,
    pub part_a: f64,
    pub part_b: f64,
}

impl LoadSplitRow {
    /// Build a row from its first share, deriving the complement.
    pub fn from_part_a(label: impl Into<String>, part_a: f64) -> Self {
        let part_a = part_a.clamp(0.0, LOAD_SPLIT_TOTAL);
        Self {
            label: label.into(),
            part_a,
            part_b: LOAD_SPLIT_TOTAL - part_a,
        }
    }

    /// Whether both shares add up to the full total.
    pub fn is_complete(&self) -> bool {
        (self.part_a + self.part_b - LOAD_SPLIT_TOTAL).abs() < f64::EPSILON
    }
}

/// Annual cost before/after for one capacity bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostRow {
    /// Capacity label (e.g. "800").
    pub bucket: String,
    pub before: f64,
    pub after: f64,
}

/// One point of the rolling time series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimePoint {
    /// Wall-clock timestamp in milliseconds.
    pub timestamp: i64,
    pub value: f64,
    pub low_threshold: f64,
    pub high_threshold: f64,
}

/// Complete, self-contained telemetry state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub kpi: Kpi,
    pub weekday_series: Vec<WeekdayRow>,
    pub load_split: Vec<LoadSplitRow>,
    pub cost_comparison: Vec<CostRow>,
    pub time_series: Vec<TimePoint>,
}

/// A violated shape invariant, reported by [`Snapshot::shape_violations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeViolation {
    WeekdayLength(usize),
    WeekdayLabel(usize),
    LoadSplitLength(usize),
    LoadSplitTotal(usize),
    EmptyCostComparison,
    SeriesTooLong(usize),
    SeriesNotIncreasing(usize),
    SeriesThresholds(usize),
}

impl Snapshot {
    /// Check every shape invariant and list the ones that fail.
    pub fn shape_violations(&self, retention: usize) -> Vec<ShapeViolation> {
        let mut violations = Vec::new();

        if self.weekday_series.len() != WEEKDAY_LABELS.len() {
            violations.push(ShapeViolation::WeekdayLength(self.weekday_series.len()));
        } else {
            for (idx, row) in self.weekday_series.iter().enumerate() {
                if row.label != WEEKDAY_LABELS[idx] {
                    violations.push(ShapeViolation::WeekdayLabel(idx));
                }
            }
        }

        if self.load_split.len() != LOAD_SPLIT_ROWS {
            violations.push(ShapeViolation::LoadSplitLength(self.load_split.len()));
        }
        for (idx, row) in self.load_split.iter().enumerate() {
            if !row.is_complete() {
                violations.push(ShapeViolation::LoadSplitTotal(idx));
            }
        }

        if self.cost_comparison.is_empty() {
            violations.push(ShapeViolation::EmptyCostComparison);
        }

        if self.time_series.len() > retention {
            violations.push(ShapeViolation::SeriesTooLong(self.time_series.len()));
        }
        for (idx, pair) in self.time_series.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                violations.push(ShapeViolation::SeriesNotIncreasing(idx + 1));
            }
        }
        if let Some(first) = self.time_series.first() {
            for (idx, point) in self.time_series.iter().enumerate() {
                if point.low_threshold >= point.high_threshold
                    || point.low_threshold != first.low_threshold
                    || point.high_threshold != first.high_threshold
                {
                    violations.push(ShapeViolation::SeriesThresholds(idx));
                }
            }
        }

        violations
    }

    /// Whether the snapshot satisfies every shape invariant.
    pub fn is_well_shaped(&self, retention: usize) -> bool {
        self.shape_violations(retention).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_uses_camel_case_wire_names() {
        let snapshot = crate::demo::build_demo_at(1_704_067_200_000);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert!(json.get("weekdaySeries").is_some());
        assert!(json.get("loadSplit").is_some());
        assert!(json.get("costComparison").is_some());
        assert!(json["kpi"].get("reductionPct").is_some());
        assert!(json["timeSeries"][0].get("lowThreshold").is_some());
    }

    #[test]
    fn test_load_split_row_complement() {
        let row = LoadSplitRow::from_part_a("With optimizer", 18.0);
        assert_eq!(row.part_b, 82.0);
        assert!(row.is_complete());

        let clamped = LoadSplitRow::from_part_a("Overflow", 130.0);
        assert_eq!(clamped.part_a, 100.0);
        assert_eq!(clamped.part_b, 0.0);
    }

    #[test]
    fn test_kpi_display() {
        let kpi = Kpi {
            reduction_pct: 64,
            payback_label: "< 4 mo".to_string(),
            log_retention_days: 14,
            device_scale: 1000,
        };
        assert_eq!(kpi.display(), ["64%", "< 4 mo", "14 days", "1000"]);
    }

    #[test]
    fn test_shape_violations_detects_unordered_series() {
        let mut snapshot = crate::demo::build_demo_at(1_704_067_200_000);
        snapshot.time_series[3].timestamp = snapshot.time_series[2].timestamp;

        let violations = snapshot.shape_violations(DEFAULT_SERIES_RETENTION);
        assert_eq!(violations, vec![ShapeViolation::SeriesNotIncreasing(3)]);
    }
}
