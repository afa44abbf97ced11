//! Process-local approximate deduplication of idempotency keys.
//!
//! Two probabilistic membership filters, *current* and *previous*, form a
//! sliding window: a background ticker fires every `window / 2`, discards
//! *previous*, promotes *current* into its place, and starts a fresh empty
//! *current*. An inserted key therefore stays visible for at least one
//! full window and at most two. Deliberately process-local — protecting
//! only against client/SDK retry storms hitting the same gateway process,
//! not cross-gateway dedup, which would need a shared store.

use bloomfilter::Bloom;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug)]
pub struct DedupConfig {
    pub window: Duration,
    pub expected_inserts_per_window: usize,
    pub false_positive_rate: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(600),
            expected_inserts_per_window: 1_000_000,
            false_positive_rate: 1e-4,
        }
    }
}

struct Filters {
    current: Bloom<String>,
    previous: Bloom<String>,
}

impl Filters {
    fn fresh(config: &DedupConfig) -> Bloom<String> {
        Bloom::new_for_fp_rate(config.expected_inserts_per_window, config.false_positive_rate)
    }
}

/// Handle to the live filter pair plus the background rotation task. Clone
/// freely; the underlying state is shared.
#[derive(Clone)]
pub struct Deduplicator {
    config: DedupConfig,
    filters: Arc<RwLock<Filters>>,
}

impl Deduplicator {
    /// Build the deduplicator and spawn its rotation ticker. The ticker
    /// exits once `shutdown` is cancelled.
    pub fn spawn(config: DedupConfig, shutdown: CancellationToken) -> Self {
        let filters = Arc::new(RwLock::new(Filters {
            current: Filters::fresh(&config),
            previous: Filters::fresh(&config),
        }));

        let dedup = Self { config, filters };

        let rotation = dedup.clone();
        let tick_period = config.window / 2;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_period);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("dedup: rotation task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        rotation.rotate();
                    }
                }
            }
        });

        dedup
    }

    fn rotate(&self) {
        let fresh = Filters::fresh(&self.config);
        let mut filters = self.filters.write();
        filters.previous = std::mem::replace(&mut filters.current, fresh);
        tracing::debug!("dedup: rotated filter window");
    }

    /// `true` if `key` was seen before within the current sliding window.
    /// An empty key always returns `false` — clients opting out of
    /// idempotency are never penalized.
    pub fn is_duplicate(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }

        {
            let filters = self.filters.read();
            if filters.current.check(&key.to_string()) || filters.previous.check(&key.to_string())
            {
                return true;
            }
        }

        // Re-check under the write lock to close the race between the
        // read-lock miss above and this insert (lost-update window).
        let mut filters = self.filters.write();
        let owned = key.to_string();
        if filters.current.check(&owned) || filters.previous.check(&owned) {
            return true;
        }
        filters.current.set(&owned);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DedupConfig {
        DedupConfig {
            window: Duration::from_millis(200),
            expected_inserts_per_window: 1000,
            false_positive_rate: 1e-4,
        }
    }

    #[tokio::test]
    async fn empty_key_is_never_a_duplicate() {
        let dedup = Deduplicator::spawn(test_config(), CancellationToken::new());
        assert!(!dedup.is_duplicate(""));
        assert!(!dedup.is_duplicate(""));
    }

    #[tokio::test]
    async fn second_insert_of_same_key_is_a_duplicate() {
        let dedup = Deduplicator::spawn(test_config(), CancellationToken::new());
        assert!(!dedup.is_duplicate("abc-123"));
        assert!(dedup.is_duplicate("abc-123"));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_collide() {
        let dedup = Deduplicator::spawn(test_config(), CancellationToken::new());
        assert!(!dedup.is_duplicate("key-a"));
        assert!(!dedup.is_duplicate("key-b"));
    }

    #[tokio::test]
    async fn rotation_eventually_forgets_a_key_after_two_windows() {
        let config = test_config();
        let dedup = Deduplicator::spawn(config, CancellationToken::new());
        assert!(!dedup.is_duplicate("rotating-key"));
        assert!(dedup.is_duplicate("rotating-key"));

        // Past two full windows the key must have aged out of both filters.
        tokio::time::sleep(config.window * 2 + Duration::from_millis(100)).await;
        assert!(!dedup.is_duplicate("rotating-key"));
    }

    #[tokio::test]
    async fn shutdown_token_stops_the_rotation_task() {
        let shutdown = CancellationToken::new();
        let dedup = Deduplicator::spawn(test_config(), shutdown.clone());
        shutdown.cancel();
        // Give the task a chance to observe cancellation; no assertion
        // beyond "this does not hang" is possible without task handles.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!dedup.is_duplicate("post-shutdown-key"));
    }
}
