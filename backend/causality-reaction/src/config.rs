//! Reaction-engine configuration from environment variables — concrete
//! per-binary `from_env`, no external config-loading crate.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReactionConfig {
    pub http_addr: String,
    pub database_url: String,
    pub broker_url: String,
    pub broker_stream_name: String,
    /// `analysis-engine` durable consumer policy.
    pub analysis_ack_wait: Duration,
    pub analysis_max_ack_pending: i64,
    pub analysis_max_deliver: i64,
    /// `alerting` durable consumer policy.
    pub alerting_ack_wait: Duration,
    pub alerting_max_ack_pending: i64,
    pub alerting_max_deliver: i64,
    pub rule_refresh_interval: Duration,
    pub dispatcher_workers: usize,
    /// Default shutdown drain window.
    pub shutdown_timeout: Duration,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ReactionConfig {
    pub fn from_env() -> Self {
        Self {
            http_addr: std::env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".to_string()),
            database_url: std::env::var("DATABASE_URL").unwrap_or_default(),
            broker_url: std::env::var("BROKER_URL")
                .unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string()),
            broker_stream_name: std::env::var("BROKER_STREAM_NAME")
                .unwrap_or_else(|_| "CAUSALITY_EVENTS".to_string()),
            analysis_ack_wait: Duration::from_secs(env_or::<u64>("ANALYSIS_ACK_WAIT_SECONDS", 10)),
            analysis_max_ack_pending: env_or("ANALYSIS_MAX_ACK_PENDING", 1_000),
            analysis_max_deliver: env_or("ANALYSIS_MAX_DELIVER", 3),
            alerting_ack_wait: Duration::from_secs(env_or::<u64>("ALERTING_ACK_WAIT_SECONDS", 5)),
            alerting_max_ack_pending: env_or("ALERTING_MAX_ACK_PENDING", 100),
            alerting_max_deliver: env_or("ALERTING_MAX_DELIVER", 3),
            rule_refresh_interval: Duration::from_secs(env_or::<u64>(
                "ENGINE_RULE_REFRESH_INTERVAL",
                30,
            )),
            dispatcher_workers: env_or("DISPATCHER_WORKERS", 4),
            shutdown_timeout: Duration::from_secs(env_or::<u64>(
                "REACTION_SHUTDOWN_TIMEOUT_SECONDS",
                30,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_consumer_policy_table() {
        let config = ReactionConfig {
            http_addr: "0.0.0.0:8081".into(),
            database_url: String::new(),
            broker_url: "nats://127.0.0.1:4222".into(),
            broker_stream_name: "CAUSALITY_EVENTS".into(),
            analysis_ack_wait: Duration::from_secs(10),
            analysis_max_ack_pending: 1_000,
            analysis_max_deliver: 3,
            alerting_ack_wait: Duration::from_secs(5),
            alerting_max_ack_pending: 100,
            alerting_max_deliver: 3,
            rule_refresh_interval: Duration::from_secs(30),
            dispatcher_workers: 4,
            shutdown_timeout: Duration::from_secs(30),
        };
        assert_eq!(config.analysis_ack_wait, Duration::from_secs(10));
        assert_eq!(config.alerting_max_ack_pending, 100);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }
}
