//! Dispatcher tuning: env-var overrides with hardcoded defaults, no
//! panic on missing vars.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Rows leased per dispatcher tick.
    pub batch_size: i64,
    /// How often a dispatcher worker polls for eligible rows.
    pub poll_interval_ms: u64,
    /// Per-delivery HTTP timeout floor; the per-webhook `timeout_ms`
    /// overrides this when smaller.
    pub default_timeout_ms: u64,
    /// Base and cap for the full-jitter backoff.
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Janitor retention for terminal rows (delivered, dead_letter).
    pub retention: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval_ms: 1_000,
            default_timeout_ms: 5_000,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 300_000,
            retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl OutboxConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: std::env::var("OUTBOX_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            poll_interval_ms: std::env::var("OUTBOX_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.poll_interval_ms),
            default_timeout_ms: std::env::var("OUTBOX_DEFAULT_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_timeout_ms),
            backoff_base_ms: std::env::var("OUTBOX_BACKOFF_BASE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.backoff_base_ms),
            backoff_cap_ms: std::env::var("OUTBOX_BACKOFF_CAP_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.backoff_cap_ms),
            retention: std::env::var("OUTBOX_RETENTION_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_backoff_shape() {
        let config = OutboxConfig::default();
        assert_eq!(config.batch_size, 100);
        assert!(config.backoff_cap_ms > config.backoff_base_ms);
    }
}
