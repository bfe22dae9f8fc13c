//! Configuration for the node agent.

use std::time::Duration;

use anyhow::Result;

use crate::controllers::image_gc::DEFAULT_CHECK_INTERVAL;

/// Node agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between image garbage collection passes.
    pub gc_check_interval: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let gc_check_interval = std::env::var("NODEOS_GC_CHECK_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CHECK_INTERVAL);

        let log_level = std::env::var("NODEOS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            gc_check_interval,
            log_level,
        })
    }
}
