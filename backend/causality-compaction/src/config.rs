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
pub struct CompactionConfig {
    pub object_store_endpoint: String,
    pub object_store_bucket: String,
    pub object_store_prefix: String,
    pub interval: Duration,
    pub target_size_bytes: u64,
    pub min_files: usize,
}

impl CompactionConfig {
    pub fn from_env() -> Self {
        Self {
            object_store_endpoint: std::env::var("OBJECT_STORE_ENDPOINT").unwrap_or_default(),
            object_store_bucket: std::env::var("OBJECT_STORE_BUCKET")
                .unwrap_or_else(|_| "causality".to_string()),
            object_store_prefix: std::env::var("OBJECT_STORE_PREFIX")
                .unwrap_or_else(|_| "events".to_string()),
            interval: Duration::from_secs(env_or("COMPACTION_INTERVAL", 3_600)),
            target_size_bytes: env_or::<u64>("COMPACTION_TARGET_SIZE", 128) * 1024 * 1024,
            min_files: env_or("COMPACTION_MIN_FILES", 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        std::env::remove_var("COMPACTION_INTERVAL");
        std::env::remove_var("COMPACTION_TARGET_SIZE");
        std::env::remove_var("COMPACTION_MIN_FILES");
        let config = CompactionConfig::from_env();
        assert_eq!(config.interval, Duration::from_secs(3_600));
        assert_eq!(config.target_size_bytes, 128 * 1024 * 1024);
        assert_eq!(config.min_files, 2);
    }
}
