//! Error types for the dashboard.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Subscriber error: {0}")]
    Subscriber(#[from] subscriber::Error),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
