//! Gateway configuration read from the environment.

use crate::error::{GatewayError, Result};
use normalizer::DEFAULT_SERIES_RETENTION;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Fastest allowed generator tick.
pub const MIN_TICK_INTERVAL_MS: u64 = 1_000;
/// Slowest allowed generator tick.
pub const MAX_TICK_INTERVAL_MS: u64 = 1_500;
/// Default generator tick.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_200;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Interface to bind the HTTP server to.
    pub host: IpAddr,
    /// HTTP port.
    pub http_port: u16,
    /// Prometheus exporter port.
    pub metrics_port: u16,
    /// Generator tick period.
    pub tick_interval: Duration,
    /// Maximum retained time-series points.
    pub series_retention: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            http_port: 3000,
            metrics_port: 9095,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            series_retention: DEFAULT_SERIES_RETENTION,
        }
    }
}

impl GatewayConfig {
    /// Read configuration from environment variables, falling back to defaults.
    ///
    /// `PORT` takes precedence over `HTTP_PORT`. The tick interval is clamped
    /// to the supported range rather than rejected.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let host = parse_or(&lookup, "HOST", defaults.host)?;
        let http_port = match lookup("PORT") {
            Some(_) => parse_or(&lookup, "PORT", defaults.http_port)?,
            None => parse_or(&lookup, "HTTP_PORT", defaults.http_port)?,
        };
        let metrics_port = parse_or(&lookup, "METRICS_PORT", defaults.metrics_port)?;
        let tick_ms = parse_or(&lookup, "TICK_INTERVAL_MS", DEFAULT_TICK_INTERVAL_MS)?
            .clamp(MIN_TICK_INTERVAL_MS, MAX_TICK_INTERVAL_MS);
        let series_retention = parse_or(&lookup, "SERIES_RETENTION", defaults.series_retention)?;

        if series_retention == 0 {
            return Err(GatewayError::InvalidConfig(
                "SERIES_RETENTION must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            host,
            http_port,
            metrics_port,
            tick_interval: Duration::from_millis(tick_ms),
            series_retention,
        })
    }

    /// Socket address for the HTTP server.
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.http_port)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| GatewayError::InvalidConfig(format!("{key} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<GatewayConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.tick_interval, Duration::from_millis(1_200));
        assert_eq!(config.series_retention, 120);
        assert_eq!(config.http_addr().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_port_takes_precedence() {
        let config = config_from(&[("PORT", "8080"), ("HTTP_PORT", "9000")]).unwrap();
        assert_eq!(config.http_port, 8080);

        let config = config_from(&[("HTTP_PORT", "9000")]).unwrap();
        assert_eq!(config.http_port, 9000);
    }

    #[test]
    fn test_tick_interval_is_clamped() {
        let config = config_from(&[("TICK_INTERVAL_MS", "100")]).unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(1_000));

        let config = config_from(&[("TICK_INTERVAL_MS", "60000")]).unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(1_500));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("PORT", "http")]).is_err());
        assert!(config_from(&[("HOST", "not-an-ip")]).is_err());
        assert!(config_from(&[("SERIES_RETENTION", "0")]).is_err());
    }
}
