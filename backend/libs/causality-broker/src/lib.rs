//! Stream broker adapter — a thin contract over a durable append-only
//! topic with hierarchical subject names and per-durable-consumer
//! server-tracked cursors.
//!
//! [`NatsBroker`] is the production implementation over NATS JetStream.
//! [`memory::InMemoryBroker`] is a deterministic fake used by the
//! gateway/sink/reaction-engine unit tests — no live NATS server needed.

pub mod error;
pub mod memory;
pub mod nats;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

pub use error::{BrokerError, Result};
pub use nats::NatsBroker;

/// Ack returned synchronously from a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub stream: String,
    pub sequence: u64,
}

/// Per-durable-consumer delivery policy.
#[derive(Debug, Clone)]
pub struct ConsumerPolicy {
    pub filter_subject: String,
    pub ack_wait: Duration,
    pub max_ack_pending: i64,
    pub max_deliver: i64,
}

/// A message delivered to a pull consumer. Exactly one of `ack`, `nak`, or
/// `term` must be called per message; callers ack only after any side
/// effects of handling it are durably committed.
#[async_trait]
pub trait BrokerMessage: Send + Sync {
    fn subject(&self) -> &str;
    fn payload(&self) -> &Bytes;
    fn stream_sequence(&self) -> u64;
    fn delivery_count(&self) -> u64;
    fn headers(&self) -> &HashMap<String, String>;

    async fn ack(&self) -> Result<()>;
    async fn nak(&self, delay: Option<Duration>) -> Result<()>;
    /// Poison marker: no further delivery of this message is attempted.
    async fn term(&self) -> Result<()>;
}

/// A pull-based handle bound to one durable consumer.
#[async_trait]
pub trait PullConsumer: Send + Sync {
    async fn fetch(&self, n: usize, max_wait: Duration) -> Result<Vec<Box<dyn BrokerMessage>>>;
}

/// Raw bytes of a historical message, as returned by random-access
/// `GetMsg`.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub subject: String,
    pub payload: Bytes,
    pub headers: HashMap<String, String>,
}

/// A max-delivery advisory: the broker's signal that a message exceeded
/// its consumer's `max_deliver` and was poisoned.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MaxDeliveriesAdvisory {
    pub stream: String,
    pub consumer: String,
    pub stream_seq: u64,
    pub deliveries: u64,
}

#[async_trait]
pub trait AdvisorySubscription: Send + Sync {
    async fn next(&mut self) -> Result<Option<MaxDeliveriesAdvisory>>;
}

/// Configuration for a stream the adapter owns or expects to exist.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub name: String,
    pub subjects: Vec<String>,
    pub max_age: Duration,
    pub max_bytes: Option<i64>,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Ensure a stream with this configuration exists.
    async fn ensure_stream(&self, config: StreamConfig) -> Result<()>;

    /// Synchronous publish; the caller retries on failure.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishAck>;

    /// Publish carrying message headers — used by the DLQ republisher to
    /// attach its own `X-DLQ-*` headers plus pass through the original
    /// message's own headers. Defaults to a header-less publish for
    /// adapters that have no header-carrying transport.
    async fn publish_with_headers(
        &self,
        subject: &str,
        headers: HashMap<String, String>,
        payload: Bytes,
    ) -> Result<PublishAck> {
        let _ = headers;
        self.publish(subject, payload).await
    }

    /// Bind (creating if absent) a durable pull consumer.
    async fn subscribe(
        &self,
        stream: &str,
        durable_name: &str,
        policy: ConsumerPolicy,
    ) -> Result<Box<dyn PullConsumer>>;

    /// Random-access retrieval of a historical message by sequence.
    async fn get_msg(&self, stream: &str, seq: u64) -> Result<RawMessage>;

    /// Subscribe to the max-delivery advisory subject for every durable
    /// consumer under observation.
    async fn advisories(&self) -> Result<Box<dyn AdvisorySubscription>>;
}
