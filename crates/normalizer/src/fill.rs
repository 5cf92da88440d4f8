//! Schema-driven default fill.
//!
//! Every field of a [`Snapshot`] is read from the payload when it has the
//! expected shape and taken from a freshly generated demo snapshot otherwise.
//! Normalization never fails: a `null`, malformed, or empty payload yields a
//! complete demo snapshot.

use crate::demo;
use crate::schema::{
    CostRow, Kpi, LoadSplitRow, Snapshot, TimePoint, WeekdayRow, DEFAULT_HIGH_THRESHOLD,
    DEFAULT_LOW_THRESHOLD, DEFAULT_SERIES_RETENTION, LOAD_SPLIT_ROWS, LOAD_SPLIT_TOTAL,
    WEEKDAY_LABELS,
};
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;

type Object = Map<String, Value>;

/// Largest accepted epoch timestamp (end of year 9999). Anything beyond is
/// treated as missing.
const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

/// Normalize a payload against the current wall clock and default retention.
pub fn normalize(payload: Option<&Value>) -> Snapshot {
    normalize_with(payload, Utc::now().timestamp_millis(), DEFAULT_SERIES_RETENTION)
}

/// Normalize a raw JSON string. Unparseable input yields a demo snapshot.
pub fn normalize_str(payload: &str) -> Snapshot {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => normalize(Some(&value)),
        Err(e) => {
            debug!("Unparseable snapshot payload, using demo data: {}", e);
            demo::build_demo()
        }
    }
}

/// Normalize a payload, using `now_ms` for repaired timestamps and keeping at
/// most `retention` time-series points.
pub fn normalize_with(payload: Option<&Value>, now_ms: i64, retention: usize) -> Snapshot {
    let fallback = demo::build_demo_at(now_ms);

    let Some(root) = payload.and_then(unwrap_envelope) else {
        debug!("Snapshot payload missing or not an object, using demo data");
        return fallback;
    };

    Snapshot {
        kpi: fill_kpi(field(root, &["kpi"]), fallback.kpi),
        weekday_series: fill_weekday_series(
            field(root, &["weekdaySeries", "baselineWeek"]),
            fallback.weekday_series,
        ),
        load_split: fill_load_split(field(root, &["loadSplit"]), fallback.load_split),
        cost_comparison: fill_cost_comparison(
            field(root, &["costComparison", "airCleanerCosts"]),
            fallback.cost_comparison,
        ),
        time_series: fill_time_series(
            field(root, &["timeSeries", "tempSeries"]),
            fallback.time_series,
            now_ms,
            retention,
        ),
    }
}

/// Accept either a bare snapshot object or a stream envelope `{type, state}`.
fn unwrap_envelope(value: &Value) -> Option<&Object> {
    let obj = value.as_object()?;
    match obj.get("state").and_then(Value::as_object) {
        Some(state) if obj.contains_key("type") => Some(state),
        _ => Some(obj),
    }
}

fn field<'a>(obj: &'a Object, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| obj.get(*name))
        .filter(|value| !value.is_null())
}

fn number(obj: &Object, names: &[&str]) -> Option<f64> {
    field(obj, names)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
}

fn text(obj: &Object, names: &[&str]) -> Option<String> {
    match field(obj, names)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp(obj: &Object, names: &[&str]) -> Option<i64> {
    number(obj, names)
        .filter(|ms| ms.abs() <= MAX_TIMESTAMP_MS as f64)
        .map(|ms| ms as i64)
}

fn count(obj: &Object, names: &[&str]) -> Option<u32> {
    number(obj, names)
        .filter(|value| *value >= 0.0)
        .map(|value| value.round().min(u32::MAX as f64) as u32)
}

fn objects(value: Option<&Value>) -> Option<impl Iterator<Item = &Object>> {
    value
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(Value::as_object))
}

fn fill_kpi(value: Option<&Value>, fallback: Kpi) -> Kpi {
    let Some(obj) = value.and_then(Value::as_object) else {
        return fallback;
    };

    Kpi {
        reduction_pct: count(obj, &["reductionPct", "overnightReductionPct"])
            .map(|pct| pct.min(100))
            .unwrap_or(fallback.reduction_pct),
        payback_label: text(obj, &["paybackLabel", "payback"]).unwrap_or(fallback.payback_label),
        log_retention_days: count(obj, &["logRetentionDays", "localLogDays"])
            .unwrap_or(fallback.log_retention_days),
        device_scale: count(obj, &["deviceScale"]).unwrap_or(fallback.device_scale),
    }
}

/// Rows are matched to weekdays by label; unlabeled rows by position.
/// Weekdays absent from the payload keep their demo values.
fn fill_weekday_series(value: Option<&Value>, fallback: Vec<WeekdayRow>) -> Vec<WeekdayRow> {
    let Some(rows) = objects(value) else {
        return fallback;
    };

    let mut series = fallback;
    for (position, row) in rows.enumerate() {
        let slot = match text(row, &["label", "day"]) {
            Some(label) => WEEKDAY_LABELS
                .iter()
                .position(|day| label.get(..3).is_some_and(|l| l.eq_ignore_ascii_case(day))),
            None => (position < WEEKDAY_LABELS.len()).then_some(position),
        };
        let Some(slot) = slot else {
            continue;
        };

        let target = &mut series[slot];
        if let Some(value_a) = number(row, &["valueA", "baseline"]) {
            target.value_a = value_a;
        }
        if let Some(value_b) = number(row, &["valueB", "post"]) {
            target.value_b = value_b;
        }
    }
    series
}

/// The second share is always recomputed as the complement of the first, so
/// the 100% invariant holds even for inconsistent payloads.
fn fill_load_split(value: Option<&Value>, fallback: Vec<LoadSplitRow>) -> Vec<LoadSplitRow> {
    let Some(rows) = objects(value) else {
        return fallback;
    };

    let mut rows = rows.take(LOAD_SPLIT_ROWS);
    fallback
        .into_iter()
        .map(|default| {
            let Some(row) = rows.next() else {
                return default;
            };
            let label = text(row, &["label"]).unwrap_or(default.label);
            match (
                number(row, &["partA", "overnight"]),
                number(row, &["partB", "daytime"]),
            ) {
                (Some(part_a), _) => LoadSplitRow::from_part_a(label, part_a),
                (None, Some(part_b)) => LoadSplitRow::from_part_a(label, LOAD_SPLIT_TOTAL - part_b),
                (None, None) => LoadSplitRow { label, ..default },
            }
        })
        .collect()
}

/// Rows missing a bucket or either amount are dropped; an empty result falls
/// back to the demo rows.
fn fill_cost_comparison(value: Option<&Value>, fallback: Vec<CostRow>) -> Vec<CostRow> {
    let Some(rows) = objects(value) else {
        return fallback;
    };

    let parsed: Vec<CostRow> = rows
        .filter_map(|row| {
            Some(CostRow {
                bucket: text(row, &["bucket", "cfm"])?,
                before: number(row, &["before"]).filter(|v| *v >= 0.0)?,
                after: number(row, &["after"]).filter(|v| *v >= 0.0)?,
            })
        })
        .collect();

    if parsed.is_empty() {
        fallback
    } else {
        parsed
    }
}

fn fill_time_series(
    value: Option<&Value>,
    fallback: Vec<TimePoint>,
    now_ms: i64,
    retention: usize,
) -> Vec<TimePoint> {
    let Some(rows) = objects(value) else {
        return fallback;
    };

    let mut points: Vec<TimePoint> = rows
        .filter_map(|row| {
            let value = number(row, &["value", "temp"])?;
            let point = match timestamp(row, &["timestamp", "ts"]) {
                Some(timestamp) => TimePoint {
                    timestamp,
                    value,
                    low_threshold: number(row, &["lowThreshold", "off"])
                        .unwrap_or(DEFAULT_LOW_THRESHOLD),
                    high_threshold: number(row, &["highThreshold", "on"])
                        .unwrap_or(DEFAULT_HIGH_THRESHOLD),
                },
                None => TimePoint {
                    timestamp: now_ms,
                    value,
                    low_threshold: DEFAULT_LOW_THRESHOLD,
                    high_threshold: DEFAULT_HIGH_THRESHOLD,
                },
            };
            Some(point)
        })
        .collect();

    if points.is_empty() || retention == 0 {
        return fallback;
    }

    // Thresholds are a property of the series, not of a point.
    let (low, high) = points
        .iter()
        .map(|p| (p.low_threshold, p.high_threshold))
        .find(|(low, high)| low < high)
        .unwrap_or((DEFAULT_LOW_THRESHOLD, DEFAULT_HIGH_THRESHOLD));

    points.sort_by_key(|p| p.timestamp);
    let mut previous: Option<i64> = None;
    for point in &mut points {
        point.low_threshold = low;
        point.high_threshold = high;
        if let Some(prev) = previous {
            if point.timestamp <= prev {
                point.timestamp = prev.saturating_add(1);
            }
        }
        previous = Some(point.timestamp);
    }

    if points.len() > retention {
        points.drain(..points.len() - retention);
    }
    points
}
