//! Retry and circuit-breaker primitives shared by services that call
//! out over the network (webhook dispatch, object storage, the broker
//! client). Scoped to the two patterns this platform actually needs —
//! no gRPC surface here, so no Tower layer or preset configs.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use retry::{full_jitter, with_retry, RetryConfig, RetryError};
