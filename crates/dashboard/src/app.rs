//! Dashboard glue: stream events in, derived view and charts out.

use crate::derived::{CompareMode, Controls, DerivedView};
use crate::render::RenderSync;
use async_trait::async_trait;
use normalizer::Snapshot;
use std::sync::{Mutex, MutexGuard, PoisonError};
use subscriber::StreamHandler;
use tracing::{debug, info};

/// Live badge colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkColor {
    Green,
    Red,
}

struct DashboardState {
    snapshot: Snapshot,
    controls: Controls,
    view: DerivedView,
    render: RenderSync,
    live: bool,
    error: bool,
}

impl DashboardState {
    fn recompute(&mut self) {
        self.view = DerivedView::compute(&self.snapshot, &self.controls);
        self.render.sync(&self.snapshot, &self.view);
    }

    fn link_color(&self) -> LinkColor {
        if self.live && !self.error {
            LinkColor::Green
        } else {
            LinkColor::Red
        }
    }
}

/// One dashboard view. Holds the latest unscaled snapshot and the user
/// controls; everything else is recomputed from those two.
pub struct Dashboard {
    state: Mutex<DashboardState>,
}

impl Dashboard {
    /// Build the view from the first-paint snapshot and mount its charts.
    pub fn new(initial: Snapshot, controls: Controls, mut render: RenderSync) -> Self {
        let view = DerivedView::compute(&initial, &controls);
        render.mount(&initial, &view);
        info!("KPIs: {}", view.kpi.join(" | "));

        Self {
            state: Mutex::new(DashboardState {
                snapshot: initial,
                controls,
                view,
                render,
                live: false,
                error: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DashboardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the snapshot and re-derive.
    pub fn apply_snapshot(&self, snapshot: Snapshot) {
        let mut state = self.lock();
        state.snapshot = snapshot;
        state.recompute();
        debug!(
            "Badge {} | savings {:.0} | {} sparkline points",
            state.view.badge.label,
            state.view.projected_savings,
            state.view.sparkline.len()
        );
    }

    /// Replace the user controls and re-derive.
    pub fn set_controls(&self, controls: Controls) {
        let mut state = self.lock();
        if state.controls != controls {
            state.controls = controls;
            state.recompute();
        }
    }

    /// Switch compare mode. Only visibility and the badge change.
    pub fn set_compare_mode(&self, mode: CompareMode) {
        let mut state = self.lock();
        state.controls.compare_mode = mode;
        state.view = DerivedView::compute(&state.snapshot, &state.controls);
        let DashboardState { render, view, .. } = &mut *state;
        render.apply_visibility(view);
        info!("Compare mode {}: {}", mode, view.badge.label);
    }

    pub fn controls(&self) -> Controls {
        self.lock().controls
    }

    pub fn view(&self) -> DerivedView {
        self.lock().view.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    pub fn link_color(&self) -> LinkColor {
        self.lock().link_color()
    }

    fn update_link(&self, update: impl FnOnce(&mut DashboardState)) {
        let mut state = self.lock();
        let before = state.link_color();
        update(&mut state);
        let after = state.link_color();
        if before != after {
            info!("Link {:?}", after);
        }
    }
}

#[async_trait]
impl StreamHandler for Dashboard {
    async fn on_snapshot(&self, snapshot: Snapshot) {
        self.apply_snapshot(snapshot);
    }

    async fn on_error(&self, is_error: bool) {
        self.update_link(|state| state.error = is_error);
    }

    async fn on_live_change(&self, live: bool) {
        self.update_link(|state| state.live = live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived::BASE_PRICE;
    use crate::render::{ChartSlot, LogChartBackend};
    use std::sync::Arc;

    fn dashboard() -> Dashboard {
        let render = RenderSync::new(Arc::new(LogChartBackend), ChartSlot::ALL);
        Dashboard::new(
            normalizer::build_demo_at(1_704_067_200_000),
            Controls::default(),
            render,
        )
    }

    #[test]
    fn test_price_changes_do_not_compound() {
        let dashboard = dashboard();
        let baseline = dashboard.view().cost_comparison;

        for price in [0.32, 0.05, 0.5, BASE_PRICE] {
            dashboard.set_controls(Controls {
                price,
                ..dashboard.controls()
            });
        }

        assert_eq!(dashboard.view().cost_comparison, baseline);
        assert_eq!(dashboard.snapshot().cost_comparison, baseline);
    }

    #[test]
    fn test_compare_mode_recomputes_badge_immediately() {
        let dashboard = dashboard();
        assert_eq!(dashboard.view().badge.label, "Savings 47%");

        dashboard.set_compare_mode(CompareMode::BOnly);
        let view = dashboard.view();
        assert_eq!(view.badge.label, "Optimized 108");
        assert!(!view.show_a);
    }

    #[test]
    fn test_reloaded_controls_rederive_view() {
        let dashboard = dashboard();
        let before = dashboard.view();

        dashboard.set_controls(Controls {
            price: BASE_PRICE * 2.0,
            device_count: 500,
            compare_mode: CompareMode::AOnly,
            ..dashboard.controls()
        });

        let view = dashboard.view();
        assert_eq!(view.badge.label, "Baseline 205");
        assert!(view.show_a && !view.show_b);
        assert_eq!(
            view.cost_comparison[0].before,
            (before.cost_comparison[0].before * 2.0).round()
        );
        assert!((view.projected_savings - before.projected_savings).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_link_color_tracks_live_and_error() {
        let dashboard = dashboard();
        assert_eq!(dashboard.link_color(), LinkColor::Red);

        dashboard.on_live_change(true).await;
        assert_eq!(dashboard.link_color(), LinkColor::Green);

        dashboard.on_error(true).await;
        assert_eq!(dashboard.link_color(), LinkColor::Red);

        dashboard.on_error(false).await;
        dashboard.on_live_change(false).await;
        assert_eq!(dashboard.link_color(), LinkColor::Red);
    }

    #[tokio::test]
    async fn test_snapshot_updates_view() {
        let dashboard = dashboard();
        let mut next = dashboard.snapshot();
        next.kpi.reduction_pct = 61;
        next.weekday_series[0].value_b = 42.0;

        dashboard.on_snapshot(next).await;
        let view = dashboard.view();
        assert_eq!(view.kpi[0], "61%");
        assert_eq!(view.badge.label, "Savings 38%");
    }
}
