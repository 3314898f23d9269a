//! Sync API configuration module.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults. Every variable is optional for local development; production
//! deployments set them explicitly.

use serde::{Deserialize, Serialize};
use std::env;

/// Sync API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP bind address (default: 0.0.0.0)
    pub bind_addr: String,

    /// HTTP server port (default: 8600)
    pub port: u16,

    /// SQLite database path (default: ./meridian-sync.db)
    pub database_path: String,

    /// Seconds between automatic queue sweeps (default: 30; 0 disables)
    pub queue_sweep_interval_secs: u64,

    /// Queue entries retried per automatic sweep (default: 100)
    pub queue_sweep_limit: u32,
}

impl ApiConfig {
    /// Load configuration from `MERIDIAN_`-prefixed environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = ApiConfig {
            bind_addr: env::var("MERIDIAN_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("MERIDIAN_PORT")
                .unwrap_or_else(|_| "8600".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MERIDIAN_PORT".to_string()))?,

            database_path: env::var("MERIDIAN_DATABASE_PATH")
                .unwrap_or_else(|_| "./meridian-sync.db".to_string()),

            queue_sweep_interval_secs: env::var("MERIDIAN_QUEUE_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("MERIDIAN_QUEUE_SWEEP_INTERVAL_SECS".to_string())
                })?,

            queue_sweep_limit: env::var("MERIDIAN_QUEUE_SWEEP_LIMIT")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MERIDIAN_QUEUE_SWEEP_LIMIT".to_string()))?,
        };

        Ok(config)
    }

    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}
