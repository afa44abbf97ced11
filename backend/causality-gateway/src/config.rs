//! Gateway configuration from environment variables — concrete
//! per-binary `from_env`, no external config-loading crate.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub http_addr: String,
    pub database_url: String,
    pub broker_url: String,
    pub broker_stream_name: String,
    pub broker_stream_max_age: Duration,
    pub broker_stream_max_bytes: Option<i64>,
    pub body_max_bytes: usize,
    pub dedup_window: Duration,
    pub dedup_capacity: usize,
    pub dedup_fp_rate: f64,
    pub rate_limit_rps: u32,
    pub rate_limit_burst: u32,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            http_addr: std::env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: std::env::var("DATABASE_URL").unwrap_or_default(),
            broker_url: std::env::var("BROKER_URL")
                .unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string()),
            broker_stream_name: std::env::var("BROKER_STREAM_NAME")
                .unwrap_or_else(|_| "CAUSALITY_EVENTS".to_string()),
            broker_stream_max_age: Duration::from_secs(env_or::<u64>(
                "BROKER_STREAM_MAX_AGE",
                7 * 24 * 3600,
            )),
            broker_stream_max_bytes: std::env::var("BROKER_STREAM_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok()),
            body_max_bytes: env_or("BODY_MAX_BYTES", 1_048_576),
            dedup_window: Duration::from_secs(env_or::<u64>("DEDUP_WINDOW", 600)),
            dedup_capacity: env_or("DEDUP_CAPACITY", 1_000_000),
            dedup_fp_rate: env_or("DEDUP_FP_RATE", 1e-4),
            rate_limit_rps: env_or("RATE_LIMIT_RPS", 100),
            rate_limit_burst: env_or("RATE_LIMIT_BURST", 200),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_when_env_is_unset() {
        let config = GatewayConfig {
            http_addr: "0.0.0.0:8080".into(),
            database_url: String::new(),
            broker_url: "nats://127.0.0.1:4222".into(),
            broker_stream_name: "CAUSALITY_EVENTS".into(),
            broker_stream_max_age: Duration::from_secs(604_800),
            broker_stream_max_bytes: None,
            body_max_bytes: 1_048_576,
            dedup_window: Duration::from_secs(600),
            dedup_capacity: 1_000_000,
            dedup_fp_rate: 1e-4,
            rate_limit_rps: 100,
            rate_limit_burst: 200,
        };
        assert_eq!(config.body_max_bytes, 1_048_576);
        assert!(config.rate_limit_burst >= config.rate_limit_rps);
    }
}
