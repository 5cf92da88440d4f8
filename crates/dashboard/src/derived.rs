//! Derived metrics: everything the dashboard shows that is not on the wire.
//!
//! [`DerivedView::compute`] is a pure function of the latest snapshot and the
//! user controls. The snapshot is always the unscaled baseline; scaled values
//! are recomputed from it on every change and never fed back in.

use normalizer::schema::{CostRow, Snapshot, TimePoint, WeekdayRow};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Price the cost comparison rows are quoted at.
pub const BASE_PRICE: f64 = 0.16;
/// Share of consumption the optimized profile saves.
pub const SAVINGS_FRACTION: f64 = 0.40;
pub const DAYS_PER_YEAR: f64 = 365.0;
/// Number of recent time-series values in the sparkline.
pub const SPARKLINE_POINTS: usize = 20;

/// Display name of the `valueA` / `before` series.
pub const SERIES_A: &str = "Baseline";
/// Display name of the `valueB` / `after` series.
pub const SERIES_B: &str = "Optimized";

/// Which comparison series are shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompareMode {
    AOnly,
    BOnly,
    #[default]
    Both,
}

impl CompareMode {
    pub fn shows_a(self) -> bool {
        matches!(self, CompareMode::AOnly | CompareMode::Both)
    }

    pub fn shows_b(self) -> bool {
        matches!(self, CompareMode::BOnly | CompareMode::Both)
    }
}

impl FromStr for CompareMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "a-only" | "a_only" | "baseline" => Ok(CompareMode::AOnly),
            "b" | "b-only" | "b_only" | "optimized" => Ok(CompareMode::BOnly),
            "both" => Ok(CompareMode::Both),
            other => Err(format!("unknown compare mode '{other}'")),
        }
    }
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareMode::AOnly => "a-only",
            CompareMode::BOnly => "b-only",
            CompareMode::Both => "both",
        })
    }
}

/// User-adjustable inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Controls {
    /// Price per unit of consumption.
    pub price: f64,
    pub device_count: u32,
    /// Daily consumption per device.
    pub per_unit_rate: f64,
    pub compare_mode: CompareMode,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            price: BASE_PRICE,
            device_count: 1_000,
            per_unit_rate: 0.5,
            compare_mode: CompareMode::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeStyle {
    Reduction,
    Increase,
    Neutral,
}

/// Headline badge over the weekday comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Badge {
    pub label: String,
    pub style: BadgeStyle,
}

/// `(sumB - sumA) / sumA`, or 0 when `sumA` is 0.
pub fn weekday_delta(rows: &[WeekdayRow]) -> f64 {
    let sum_a: f64 = rows.iter().map(|r| r.value_a).sum();
    let sum_b: f64 = rows.iter().map(|r| r.value_b).sum();
    if sum_a == 0.0 {
        0.0
    } else {
        (sum_b - sum_a) / sum_a
    }
}

/// Badge for the visible weekday series.
///
/// With both series shown the badge is the relative delta. With one series
/// shown there is nothing to compare, so it shows that series' total.
pub fn compare_badge(rows: &[WeekdayRow], mode: CompareMode) -> Badge {
    match mode {
        CompareMode::Both => delta_badge(weekday_delta(rows)),
        CompareMode::AOnly => total_badge(SERIES_A, rows.iter().map(|r| r.value_a).sum()),
        CompareMode::BOnly => total_badge(SERIES_B, rows.iter().map(|r| r.value_b).sum()),
    }
}

fn delta_badge(delta: f64) -> Badge {
    let pct = (delta.abs() * 100.0).round();
    if delta < 0.0 {
        Badge {
            label: format!("Savings {pct}%"),
            style: BadgeStyle::Reduction,
        }
    } else if delta > 0.0 {
        Badge {
            label: format!("Increase {pct}%"),
            style: BadgeStyle::Increase,
        }
    } else {
        Badge {
            label: "No change".to_string(),
            style: BadgeStyle::Neutral,
        }
    }
}

fn total_badge(series: &str, total: f64) -> Badge {
    Badge {
        label: format!("{series} {}", total.round()),
        style: BadgeStyle::Neutral,
    }
}

/// Rescale cost rows quoted at [`BASE_PRICE`] to `price`, rounded to whole units.
pub fn scale_costs(baseline: &[CostRow], price: f64) -> Vec<CostRow> {
    let factor = price / BASE_PRICE;
    baseline
        .iter()
        .map(|row| CostRow {
            bucket: row.bucket.clone(),
            before: (row.before * factor).round(),
            after: (row.after * factor).round(),
        })
        .collect()
}

/// Yearly savings estimate for the configured fleet.
pub fn projected_savings(controls: &Controls) -> f64 {
    f64::from(controls.device_count)
        * controls.per_unit_rate
        * DAYS_PER_YEAR
        * controls.price
        * SAVINGS_FRACTION
}

/// The most recent `points` series values, oldest first.
pub fn sparkline(series: &[TimePoint], points: usize) -> Vec<f64> {
    let skip = series.len().saturating_sub(points);
    series[skip..].iter().map(|p| p.value).collect()
}

/// Everything derived from one (snapshot, controls) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedView {
    pub kpi: [String; 4],
    pub badge: Badge,
    pub weekday_delta: f64,
    pub show_a: bool,
    pub show_b: bool,
    pub cost_comparison: Vec<CostRow>,
    pub projected_savings: f64,
    pub sparkline: Vec<f64>,
}

impl DerivedView {
    pub fn compute(snapshot: &Snapshot, controls: &Controls) -> Self {
        Self {
            kpi: snapshot.kpi.display(),
            badge: compare_badge(&snapshot.weekday_series, controls.compare_mode),
            weekday_delta: weekday_delta(&snapshot.weekday_series),
            show_a: controls.compare_mode.shows_a(),
            show_b: controls.compare_mode.shows_b(),
            cost_comparison: scale_costs(&snapshot.cost_comparison, controls.price),
            projected_savings: projected_savings(controls),
            sparkline: sparkline(&snapshot.time_series, SPARKLINE_POINTS),
        }
    }
}
