//! Dashboard configuration read from the environment.

use crate::derived::{CompareMode, Controls};
use crate::error::{DashboardError, Result};
use std::env;
use std::str::FromStr;
use subscriber::SubscriberConfig;

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub subscriber: SubscriberConfig,
    /// Initial control values.
    pub controls: Controls,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup("DASHBOARD_BASE_URL")
            .unwrap_or_else(|| subscriber::sse_manager::DEFAULT_BASE_URL.to_string());
        let subscriber = SubscriberConfig::new(&base_url)?;
        subscriber.validate()?;

        let defaults = Controls::default();
        let controls = Controls {
            price: parse_or(&lookup, "PRICE_PER_UNIT", defaults.price)?,
            device_count: parse_or(&lookup, "DEVICE_COUNT", defaults.device_count)?,
            per_unit_rate: parse_or(&lookup, "PER_UNIT_KWH", defaults.per_unit_rate)?,
            compare_mode: parse_or(&lookup, "COMPARE_MODE", CompareMode::default())?,
        };

        if !controls.price.is_finite() || controls.price < 0.0 {
            return Err(DashboardError::InvalidConfig(
                "PRICE_PER_UNIT must be a non-negative number".to_string(),
            ));
        }
        if !controls.per_unit_rate.is_finite() || controls.per_unit_rate < 0.0 {
            return Err(DashboardError::InvalidConfig(
                "PER_UNIT_KWH must be a non-negative number".to_string(),
            ));
        }

        Ok(Self {
            subscriber,
            controls,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            DashboardError::InvalidConfig(format!("{key} has invalid value '{raw}'"))
        }),
        None => Ok(default),
    }
}
