//! State generator: advances the canonical snapshot on a fixed tick and fans
//! each new state out to stream clients.
//!
//! Every perturbation is a bounded sine wave plus small noise, clamped so
//! chart axes never need rescaling:
//!
//! | Field                     | Base | Swing | Period | Clamp    |
//! |---------------------------|------|-------|--------|----------|
//! | last weekday `valueB`     | 20   | 5     | 3 s    | 10..=32  |
//! | load split row 0 `partA`  | 40   | 5     | 3 s    | 8..=70   |
//! | load split row 1 `partA`  | 18   | 8     | 3 s    | 8..=70   |
//! | time-series value         | 75   | 4.5   | 2 s    | 69..=81  |
//! | `kpi.reductionPct`        | 64   | 3     | 3 s    | 61..=67  |

use crate::client::ClientRegistry;
use crate::error::Result;
use crate::protocol::StreamMessage;
use crate::store::SnapshotStore;
use chrono::Utc;
use metrics::{counter, gauge};
use normalizer::schema::{
    LoadSplitRow, Snapshot, TimePoint, DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD,
    SERIES_VALUE_MAX, SERIES_VALUE_MIN,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

const WEEKDAY_B_BASE: f64 = 20.0;
const WEEKDAY_B_SWING: f64 = 5.0;
const WEEKDAY_B_NOISE: f64 = 0.6;
const WEEKDAY_B_RANGE: (f64, f64) = (10.0, 32.0);

/// (base, swing) per load split row.
const LOAD_SPLIT_WAVES: [(f64, f64); 2] = [(40.0, 5.0), (18.0, 8.0)];
const LOAD_SPLIT_NOISE: f64 = 0.75;
const LOAD_SPLIT_RANGE: (f64, f64) = (8.0, 70.0);

const SERIES_BASE: f64 = 75.0;
const SERIES_SWING: f64 = 4.5;
const SERIES_NOISE: f64 = 0.5;

const KPI_BASE: f64 = 64.0;
const KPI_SWING: f64 = 3.0;

const SLOW_PERIOD_MS: f64 = 3_000.0;
const FAST_PERIOD_MS: f64 = 2_000.0;

fn noise<R: Rng + ?Sized>(rng: &mut R, amplitude: f64) -> f64 {
    rng.gen_range(-amplitude..=amplitude)
}

/// Advances a snapshot one tick at a time.
pub struct Generator {
    retention: usize,
    rng: StdRng,
}

impl Generator {
    /// Create a generator keeping at most `retention` time-series points.
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a generator with a fixed noise seed.
    pub fn with_seed(retention: usize, seed: u64) -> Self {
        Self {
            retention: retention.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Produce the snapshot following `previous` at wall-clock `now_ms`.
    /// Cost comparison rows are static and carried over unchanged.
    pub fn next_snapshot(&mut self, previous: &Snapshot, now_ms: i64) -> Snapshot {
        let t = now_ms as f64;
        let slow = (t / SLOW_PERIOD_MS).sin();
        let fast = (t / FAST_PERIOD_MS).sin();

        let mut weekday_series = previous.weekday_series.clone();
        if let Some(last) = weekday_series.last_mut() {
            let value =
                WEEKDAY_B_BASE + WEEKDAY_B_SWING * slow + noise(&mut self.rng, WEEKDAY_B_NOISE);
            last.value_b = value.round().clamp(WEEKDAY_B_RANGE.0, WEEKDAY_B_RANGE.1);
        }

        let load_split = previous
            .load_split
            .iter()
            .zip(LOAD_SPLIT_WAVES)
            .map(|(row, (base, swing))| {
                let part_a = base + swing * slow + noise(&mut self.rng, LOAD_SPLIT_NOISE);
                LoadSplitRow::from_part_a(
                    row.label.clone(),
                    part_a.round().clamp(LOAD_SPLIT_RANGE.0, LOAD_SPLIT_RANGE.1),
                )
            })
            .collect();

        let value = SERIES_BASE + SERIES_SWING * fast + noise(&mut self.rng, SERIES_NOISE);
        let timestamp = match previous.time_series.last() {
            Some(last) if last.timestamp >= now_ms => last.timestamp + 1,
            _ => now_ms,
        };
        let keep = self.retention - 1;
        let skip = previous.time_series.len().saturating_sub(keep);
        let mut time_series = Vec::with_capacity(self.retention);
        time_series.extend_from_slice(&previous.time_series[skip..]);
        time_series.push(TimePoint {
            timestamp,
            value: value.round().clamp(SERIES_VALUE_MIN, SERIES_VALUE_MAX),
            low_threshold: DEFAULT_LOW_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
        });

        let mut kpi = previous.kpi.clone();
        kpi.reduction_pct = (KPI_BASE + KPI_SWING * slow).round() as u32;

        Snapshot {
            kpi,
            weekday_series,
            load_split,
            cost_comparison: previous.cost_comparison.clone(),
            time_series,
        }
    }

    /// Advance the store and broadcast one tick.
    pub fn tick(
        &mut self,
        store: &SnapshotStore,
        registry: &ClientRegistry,
        now_ms: i64,
    ) -> Arc<Snapshot> {
        let previous = store.current();
        let next = store.replace(self.next_snapshot(&previous, now_ms));
        let delivered = registry.broadcast(&StreamMessage::Tick(&next));

        counter!("gateway_ticks_total").increment(1);
        gauge!("gateway_active_streams").set(registry.client_count() as f64);
        debug!("Tick {} delivered to {} clients", store.tick_count(), delivered);
        next
    }

    /// Run the tick loop until shutdown.
    pub async fn run(
        mut self,
        store: Arc<SnapshotStore>,
        registry: Arc<ClientRegistry>,
        tick_interval: Duration,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        info!("Starting generator, ticking every {:?}", tick_interval);

        let mut ticker = interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the seed is the first state.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Generator received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    self.tick(&store, &registry, Utc::now().timestamp_millis());
                }
            }
        }

        info!("Generator stopped after {} ticks", store.tick_count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientState;
    use normalizer::DEFAULT_SERIES_RETENTION;

    const START: i64 = 1_704_067_200_000;

    fn run_ticks(generator: &mut Generator, ticks: usize, step_ms: i64) -> Vec<Snapshot> {
        let mut current = normalizer::build_demo_at(START);
        let mut history = Vec::with_capacity(ticks);
        for i in 0..ticks {
            current = generator.next_snapshot(&current, START + (i as i64 + 1) * step_ms);
            history.push(current.clone());
        }
        history
    }

    #[test]
    fn test_load_split_always_sums_to_total() {
        let mut generator = Generator::with_seed(DEFAULT_SERIES_RETENTION, 7);
        for snapshot in run_ticks(&mut generator, 500, 1_200) {
            for row in &snapshot.load_split {
                assert_eq!(row.part_a + row.part_b, 100.0);
                assert!((8.0..=70.0).contains(&row.part_a));
            }
        }
    }

    #[test]
    fn test_series_capped_and_strictly_increasing() {
        let mut generator = Generator::with_seed(DEFAULT_SERIES_RETENTION, 11);
        for snapshot in run_ticks(&mut generator, 300, 1_200) {
            assert!(snapshot.time_series.len() <= DEFAULT_SERIES_RETENTION);
            assert!(snapshot.is_well_shaped(DEFAULT_SERIES_RETENTION));
        }
    }

    #[test]
    fn test_series_window_drops_oldest_first() {
        let mut generator = Generator::with_seed(20, 3);
        let history = run_ticks(&mut generator, 30, 1_200);
        let last = history.last().unwrap();

        assert_eq!(last.time_series.len(), 20);
        assert_eq!(last.time_series.last().unwrap().timestamp, START + 30 * 1_200);
        assert_eq!(last.time_series[0].timestamp, START + 11 * 1_200);
    }

    #[test]
    fn test_stalled_clock_still_advances_timestamps() {
        let mut generator = Generator::with_seed(DEFAULT_SERIES_RETENTION, 5);
        let history = run_ticks(&mut generator, 10, 0);
        for snapshot in &history {
            assert!(snapshot.is_well_shaped(DEFAULT_SERIES_RETENTION));
        }
    }

    #[test]
    fn test_values_stay_within_clamps() {
        let mut generator = Generator::with_seed(DEFAULT_SERIES_RETENTION, 13);
        for snapshot in run_ticks(&mut generator, 400, 917) {
            let friday = snapshot.weekday_series.last().unwrap();
            assert!((10.0..=32.0).contains(&friday.value_b));
            assert!((61..=67).contains(&snapshot.kpi.reduction_pct));
            let point = snapshot.time_series.last().unwrap();
            assert!((SERIES_VALUE_MIN..=SERIES_VALUE_MAX).contains(&point.value));
        }
    }

    #[tokio::test]
    async fn test_tick_replaces_store_and_broadcasts() {
        let store = SnapshotStore::new(normalizer::build_demo_at(START));
        let registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(Arc::new(ClientState::new(tx)));

        let mut generator = Generator::with_seed(DEFAULT_SERIES_RETENTION, 1);
        let next = generator.tick(&store, &registry, START + 1_200);

        assert!(Arc::ptr_eq(&next, &store.current()));
        assert_eq!(store.tick_count(), 1);
        let payload = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "tick");
        assert_eq!(
            value["state"]["timeSeries"].as_array().unwrap().len(),
            next.time_series.len()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(SnapshotStore::new(normalizer::build_demo_at(START)));
        let registry = Arc::new(ClientRegistry::new());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let generator = Generator::with_seed(DEFAULT_SERIES_RETENTION, 2);
        let handle = tokio::spawn(generator.run(
            store.clone(),
            registry,
            Duration::from_millis(1_200),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(3_700)).await;
        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(store.tick_count(), 3);
    }
}
