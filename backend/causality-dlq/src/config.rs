//! Environment configuration: concrete per-binary `from_env`, no
//! external config-loading crate.

use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct DlqConfig {
    pub broker_url: String,
    pub broker_stream_name: String,
    pub dlq_stream_name: String,
    pub dlq_max_age: Duration,
}

impl DlqConfig {
    pub fn from_env() -> Self {
        Self {
            broker_url: std::env::var("BROKER_URL")
                .unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string()),
            broker_stream_name: std::env::var("BROKER_STREAM_NAME")
                .unwrap_or_else(|_| "CAUSALITY_EVENTS".to_string()),
            dlq_stream_name: std::env::var("DLQ_STREAM_NAME")
                .unwrap_or_else(|_| "CAUSALITY_DLQ".to_string()),
            // 30-day retention vs the main stream's 7 days.
            dlq_max_age: Duration::from_secs(env_or::<u64>("DLQ_MAX_AGE", 30 * 24 * 3_600)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retention_is_thirty_days() {
        std::env::remove_var("DLQ_MAX_AGE");
        std::env::remove_var("DLQ_STREAM_NAME");
        let config = DlqConfig::from_env();
        assert_eq!(config.dlq_max_age, Duration::from_secs(30 * 24 * 3_600));
        assert_eq!(config.dlq_stream_name, "CAUSALITY_DLQ");
    }
}
