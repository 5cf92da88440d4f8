//! Demo snapshot builder.
//!
//! The same seed values back the gateway's initial state and the client's
//! offline fallback, so a dashboard with no server still renders a full,
//! plausible picture.

use crate::schema::{
    CostRow, Kpi, LoadSplitRow, Snapshot, TimePoint, WeekdayRow, DEFAULT_HIGH_THRESHOLD,
    DEFAULT_LOW_THRESHOLD, SERIES_VALUE_MAX, SERIES_VALUE_MIN, WEEKDAY_LABELS,
};
use chrono::Utc;
use rand::Rng;

/// Number of points in a freshly seeded time series.
pub const DEMO_SERIES_POINTS: usize = 15;

/// Spacing between seeded time-series points.
pub const DEMO_SERIES_SPACING_MS: i64 = 5_000;

const DEMO_WEEKDAY_VALUES: [(f64, f64); 5] = [
    (42.0, 22.0),
    (40.0, 21.0),
    (44.0, 23.0),
    (41.0, 22.0),
    (38.0, 20.0),
];

const DEMO_COST_ROWS: [(&str, f64, f64); 4] = [
    ("400", 355.0, 127.0),
    ("800", 709.0, 253.0),
    ("1200", 1112.0, 397.0),
    ("1500", 1934.0, 692.0),
];

/// Labels of the two load split rows.
pub const LOAD_SPLIT_LABELS: [&str; 2] = ["Typical (before)", "Optimized"];

/// Seed KPI values.
pub fn demo_kpi() -> Kpi {
    Kpi {
        reduction_pct: 64,
        payback_label: "< 4 mo".to_string(),
        log_retention_days: 14,
        device_scale: 1000,
    }
}

/// Seed weekday comparison rows.
pub fn demo_weekday_series() -> Vec<WeekdayRow> {
    WEEKDAY_LABELS
        .iter()
        .zip(DEMO_WEEKDAY_VALUES)
        .map(|(label, (value_a, value_b))| WeekdayRow {
            label: (*label).to_string(),
            value_a,
            value_b,
        })
        .collect()
}

/// Seed load split rows.
pub fn demo_load_split() -> Vec<LoadSplitRow> {
    vec![
        LoadSplitRow::from_part_a(LOAD_SPLIT_LABELS[0], 40.0),
        LoadSplitRow::from_part_a(LOAD_SPLIT_LABELS[1], 18.0),
    ]
}

/// Seed cost comparison rows, ordered by bucket capacity.
pub fn demo_cost_comparison() -> Vec<CostRow> {
    DEMO_COST_ROWS
        .iter()
        .map(|(bucket, before, after)| CostRow {
            bucket: (*bucket).to_string(),
            before: *before,
            after: *after,
        })
        .collect()
}

/// Seed time series ending at `now_ms`, spaced five seconds apart.
pub fn demo_time_series<R: Rng + ?Sized>(now_ms: i64, rng: &mut R) -> Vec<TimePoint> {
    (0..DEMO_SERIES_POINTS as i64)
        .map(|i| {
            let timestamp = now_ms - (DEMO_SERIES_POINTS as i64 - 1 - i) * DEMO_SERIES_SPACING_MS;
            let wave = 75.0 + 3.5 * (timestamp as f64 / 2_500.0).sin();
            let noise = rng.gen_range(-0.4..=0.4);
            TimePoint {
                timestamp,
                value: (wave + noise).clamp(SERIES_VALUE_MIN, SERIES_VALUE_MAX).round(),
                low_threshold: DEFAULT_LOW_THRESHOLD,
                high_threshold: DEFAULT_HIGH_THRESHOLD,
            }
        })
        .collect()
}

/// Build a demo snapshot whose series ends at `now_ms`, using `rng` for noise.
pub fn build_demo_with<R: Rng + ?Sized>(now_ms: i64, rng: &mut R) -> Snapshot {
    Snapshot {
        kpi: demo_kpi(),
        weekday_series: demo_weekday_series(),
        load_split: demo_load_split(),
        cost_comparison: demo_cost_comparison(),
        time_series: demo_time_series(now_ms, rng),
    }
}

/// Build a demo snapshot whose series ends at `now_ms`.
pub fn build_demo_at(now_ms: i64) -> Snapshot {
    build_demo_with(now_ms, &mut rand::thread_rng())
}

/// Build a demo snapshot whose series ends now.
pub fn build_demo() -> Snapshot {
    build_demo_at(Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DEFAULT_SERIES_RETENTION;

    #[test]
    fn test_demo_is_well_shaped() {
        for _ in 0..20 {
            let snapshot = build_demo();
            assert!(
                snapshot.is_well_shaped(DEFAULT_SERIES_RETENTION),
                "{:?}",
                snapshot.shape_violations(DEFAULT_SERIES_RETENTION)
            );
        }
    }

    #[test]
    fn test_demo_series_ends_at_now() {
        let now = 1_704_067_200_000;
        let series = demo_time_series(now, &mut rand::thread_rng());

        assert_eq!(series.len(), DEMO_SERIES_POINTS);
        assert_eq!(series.last().unwrap().timestamp, now);
        assert_eq!(series[0].timestamp, now - 14 * DEMO_SERIES_SPACING_MS);
        assert!(series
            .iter()
            .all(|p| (SERIES_VALUE_MIN..=SERIES_VALUE_MAX).contains(&p.value)));
    }

    #[test]
    fn test_demo_cost_rows_are_ordered() {
        let rows = demo_cost_comparison();
        let buckets: Vec<u32> = rows.iter().map(|r| r.bucket.parse().unwrap()).collect();
        assert!(buckets.windows(2).all(|w| w[0] < w[1]));
        assert!(rows.iter().all(|r| r.after <= r.before));
    }
}
