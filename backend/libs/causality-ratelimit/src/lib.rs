//! Per-`app_id` token-bucket rate limiting for the ingestion gateway.
//! Built on `governor`'s keyed limiter, one bucket per authenticated
//! tenant rather than one global bucket.

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 100,
            burst_size: 200,
        }
    }
}

/// How long the caller should wait before retrying, surfaced as the
/// `Retry-After` header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDenied {
    pub retry_after: Duration,
}

pub struct KeyedRateLimiter {
    clock: DefaultClock,
    limiter: GovernorRateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
}

impl KeyedRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let per_second =
            NonZeroU32::new(config.requests_per_second).expect("requests_per_second must be > 0");
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Self {
            clock: DefaultClock::default(),
            limiter: GovernorRateLimiter::keyed(quota),
        }
    }

    /// `Ok(())` admits the request; `Err` carries how long to wait.
    pub fn check(&self, app_id: &str) -> Result<(), RateLimitDenied> {
        match self.limiter.check_key(&app_id.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(self.clock.now());
                tracing::debug!(app_id, retry_after_ms = %retry_after.as_millis(), "rate limit denied");
                Err(RateLimitDenied { retry_after })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_requests_within_burst() {
        let limiter = KeyedRateLimiter::new(RateLimitConfig {
            requests_per_second: 5,
            burst_size: 3,
        });
        assert!(limiter.check("tenant-a").is_ok());
        assert!(limiter.check("tenant-a").is_ok());
        assert!(limiter.check("tenant-a").is_ok());
    }

    #[test]
    fn denies_once_burst_is_exhausted() {
        let limiter = KeyedRateLimiter::new(RateLimitConfig {
            requests_per_second: 1,
            burst_size: 1,
        });
        assert!(limiter.check("tenant-b").is_ok());
        let denied = limiter.check("tenant-b");
        assert!(denied.is_err());
        assert!(denied.unwrap_err().retry_after > Duration::ZERO);
    }

    #[test]
    fn each_key_has_an_independent_bucket() {
        let limiter = KeyedRateLimiter::new(RateLimitConfig {
            requests_per_second: 1,
            burst_size: 1,
        });
        assert!(limiter.check("tenant-c").is_ok());
        assert!(limiter.check("tenant-c").is_err());
        // A different tenant is unaffected by tenant-c's exhausted bucket.
        assert!(limiter.check("tenant-d").is_ok());
    }
}
