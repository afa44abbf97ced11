//! Environment configuration: concrete per-binary `from_env`, no
//! external config-loading crate.

use causality_parquet::Compression;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub broker_url: String,
    pub broker_stream_name: String,
    pub durable_name: String,
    pub ack_wait: Duration,
    pub max_ack_pending: i64,
    pub max_deliver: i64,
    pub object_store_endpoint: String,
    pub object_store_bucket: String,
    pub object_store_prefix: String,
    pub batch_max_events: usize,
    pub batch_flush_interval: Duration,
    pub compression: Compression,
    pub num_fetchers: usize,
    pub fetch_batch_size: usize,
    pub fetch_max_wait: Duration,
    pub shutdown_timeout: Duration,
}

impl SinkConfig {
    pub fn from_env() -> Self {
        let compression = match std::env::var("PARQUET_COMPRESSION")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "gzip" => Compression::Gzip,
            "zstd" => Compression::Zstd,
            "none" => Compression::None,
            _ => Compression::Snappy,
        };

        Self {
            broker_url: std::env::var("BROKER_URL")
                .unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string()),
            broker_stream_name: std::env::var("BROKER_STREAM_NAME")
                .unwrap_or_else(|_| "CAUSALITY_EVENTS".to_string()),
            durable_name: std::env::var("SINK_DURABLE_NAME")
                .unwrap_or_else(|_| "warehouse-sink".to_string()),
            ack_wait: Duration::from_secs(env_or("SINK_ACK_WAIT_SECONDS", 30)),
            max_ack_pending: env_or("SINK_MAX_ACK_PENDING", 10_000),
            max_deliver: env_or("SINK_MAX_DELIVER", 5),
            object_store_endpoint: std::env::var("OBJECT_STORE_ENDPOINT").unwrap_or_default(),
            object_store_bucket: std::env::var("OBJECT_STORE_BUCKET")
                .unwrap_or_else(|_| "causality".to_string()),
            object_store_prefix: std::env::var("OBJECT_STORE_PREFIX")
                .unwrap_or_else(|_| "events".to_string()),
            batch_max_events: env_or("BATCH_MAX_EVENTS", 10_000),
            batch_flush_interval: Duration::from_secs(env_or("BATCH_FLUSH_INTERVAL", 60)),
            compression,
            num_fetchers: env_or("SINK_FETCHER_COUNT", 4),
            fetch_batch_size: env_or("SINK_FETCH_BATCH_SIZE", 256),
            fetch_max_wait: Duration::from_millis(env_or("SINK_FETCH_MAX_WAIT_MS", 1_000)),
            shutdown_timeout: Duration::from_secs(env_or("SINK_SHUTDOWN_TIMEOUT_SECONDS", 60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_consumer_policy_table() {
        std::env::remove_var("SINK_ACK_WAIT_SECONDS");
        std::env::remove_var("SINK_MAX_ACK_PENDING");
        std::env::remove_var("SINK_MAX_DELIVER");
        let config = SinkConfig::from_env();
        assert_eq!(config.ack_wait, Duration::from_secs(30));
        assert_eq!(config.max_ack_pending, 10_000);
        assert_eq!(config.max_deliver, 5);
    }
}
