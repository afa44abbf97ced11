//! A deterministic in-memory [`Broker`] fake.
//!
//! Exercises the same publish/fetch/ack/nak/term/advisory contract as
//! [`crate::nats::NatsBroker`] without a live NATS server, so the
//! gateway, warehouse sink, and reaction engine can be unit tested in
//! isolation.

use crate::error::Result;
use crate::{
    AdvisorySubscription, Broker, BrokerMessage, ConsumerPolicy, MaxDeliveriesAdvisory,
    PublishAck, PullConsumer, RawMessage, StreamConfig,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Clone)]
struct StoredMessage {
    seq: u64,
    subject: String,
    payload: Bytes,
    headers: HashMap<String, String>,
}

struct ConsumerState {
    policy: ConsumerPolicy,
    /// Sequences not yet delivered for the first time.
    next_seq_idx: usize,
    /// Sequences pending redelivery, with their current delivery count.
    redeliver: VecDeque<(u64, u64)>,
}

struct StreamState {
    messages: Vec<StoredMessage>,
    consumers: HashMap<String, ConsumerState>,
}

struct Inner {
    streams: HashMap<String, StreamState>,
    advisory_tx: mpsc::UnboundedSender<MaxDeliveriesAdvisory>,
    advisory_rx: Option<mpsc::UnboundedReceiver<MaxDeliveriesAdvisory>>,
}

#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                streams: HashMap::new(),
                advisory_tx: tx,
                advisory_rx: Some(rx),
            })),
        }
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: total messages ever published to a stream.
    pub fn len(&self, stream: &str) -> usize {
        self.inner
            .lock()
            .streams
            .get(stream)
            .map(|s| s.messages.len())
            .unwrap_or(0)
    }
}

fn matches_filter(subject: &str, filter: &str) -> bool {
    if filter.is_empty() || filter == ">" {
        return true;
    }
    let subject_tokens: Vec<&str> = subject.split('.').collect();
    let filter_tokens: Vec<&str> = filter.split('.').collect();
    for (i, ft) in filter_tokens.iter().enumerate() {
        if *ft == ">" {
            return true;
        }
        match subject_tokens.get(i) {
            Some(st) if *ft == "*" || ft == st => continue,
            _ => return false,
        }
    }
    subject_tokens.len() == filter_tokens.len()
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn ensure_stream(&self, config: StreamConfig) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.streams.entry(config.name).or_insert_with(|| StreamState {
            messages: Vec::new(),
            consumers: HashMap::new(),
        });
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishAck> {
        self.publish_with_headers(subject, HashMap::new(), payload).await
    }

    async fn publish_with_headers(
        &self,
        subject: &str,
        headers: HashMap<String, String>,
        payload: Bytes,
    ) -> Result<PublishAck> {
        let mut inner = self.inner.lock();
        // Route to every stream whose subject space has not been scoped
        // (tests normally only register one stream); fall back to a
        // default stream name derived from the subject's first token.
        let stream_name = if inner.streams.is_empty() {
            "TEST_STREAM".to_string()
        } else {
            inner
                .streams
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| "TEST_STREAM".to_string())
        };
        let stream = inner
            .streams
            .entry(stream_name.clone())
            .or_insert_with(|| StreamState {
                messages: Vec::new(),
                consumers: HashMap::new(),
            });
        let seq = stream.messages.len() as u64 + 1;
        stream.messages.push(StoredMessage {
            seq,
            subject: subject.to_owned(),
            payload,
            headers,
        });
        Ok(PublishAck {
            stream: stream_name,
            sequence: seq,
        })
    }

    async fn subscribe(
        &self,
        stream: &str,
        durable_name: &str,
        policy: ConsumerPolicy,
    ) -> Result<Box<dyn PullConsumer>> {
        let mut inner = self.inner.lock();
        let stream_state = inner
            .streams
            .entry(stream.to_owned())
            .or_insert_with(|| StreamState {
                messages: Vec::new(),
                consumers: HashMap::new(),
            });
        stream_state
            .consumers
            .entry(durable_name.to_owned())
            .or_insert_with(|| ConsumerState {
                policy,
                next_seq_idx: 0,
                redeliver: VecDeque::new(),
            });
        Ok(Box::new(InMemoryPullConsumer {
            inner: self.inner.clone(),
            stream: stream.to_owned(),
            durable_name: durable_name.to_owned(),
        }))
    }

    async fn get_msg(&self, stream: &str, seq: u64) -> Result<RawMessage> {
        let inner = self.inner.lock();
        let msg = inner
            .streams
            .get(stream)
            .and_then(|s| s.messages.iter().find(|m| m.seq == seq))
            .ok_or_else(|| crate::BrokerError::NotFound {
                stream: stream.to_owned(),
                seq,
            })?;
        Ok(RawMessage {
            subject: msg.subject.clone(),
            payload: msg.payload.clone(),
            headers: msg.headers.clone(),
        })
    }

    async fn advisories(&self) -> Result<Box<dyn AdvisorySubscription>> {
        let rx = self
            .inner
            .lock()
            .advisory_rx
            .take()
            .expect("advisories() called more than once on the in-memory broker fake");
        Ok(Box::new(InMemoryAdvisorySubscription { rx }))
    }
}

struct InMemoryPullConsumer {
    inner: Arc<Mutex<Inner>>,
    stream: String,
    durable_name: String,
}

#[async_trait]
impl PullConsumer for InMemoryPullConsumer {
    async fn fetch(&self, n: usize, _max_wait: Duration) -> Result<Vec<Box<dyn BrokerMessage>>> {
        let mut inner = self.inner.lock();
        let advisory_tx = inner.advisory_tx.clone();
        let Some(stream_state) = inner.streams.get_mut(&self.stream) else {
            return Ok(Vec::new());
        };
        let messages = stream_state.messages.clone();
        let Some(consumer) = stream_state.consumers.get_mut(&self.durable_name) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::with_capacity(n);

        while out.len() < n {
            if let Some((seq, count)) = consumer.redeliver.pop_front() {
                if let Some(msg) = messages.iter().find(|m| m.seq == seq) {
                    if matches_filter(&msg.subject, &consumer.policy.filter_subject) {
                        out.push(to_handle(
                            self.inner.clone(),
                            self.stream.clone(),
                            self.durable_name.clone(),
                            msg.clone(),
                            count,
                        ));
                        continue;
                    }
                }
                continue;
            }

            if consumer.next_seq_idx >= messages.len() {
                break;
            }
            let msg = messages[consumer.next_seq_idx].clone();
            consumer.next_seq_idx += 1;
            if !matches_filter(&msg.subject, &consumer.policy.filter_subject) {
                continue;
            }
            out.push(to_handle(
                self.inner.clone(),
                self.stream.clone(),
                self.durable_name.clone(),
                msg,
                1,
            ));
        }

        let _ = advisory_tx;
        Ok(out)
    }
}

fn to_handle(
    inner: Arc<Mutex<Inner>>,
    stream: String,
    durable_name: String,
    msg: StoredMessage,
    delivery_count: u64,
) -> Box<dyn BrokerMessage> {
    Box::new(InMemoryBrokerMessage {
        inner,
        stream,
        durable_name,
        msg,
        delivery_count,
    })
}

struct InMemoryBrokerMessage {
    inner: Arc<Mutex<Inner>>,
    stream: String,
    durable_name: String,
    msg: StoredMessage,
    delivery_count: u64,
}

#[async_trait]
impl BrokerMessage for InMemoryBrokerMessage {
    fn subject(&self) -> &str {
        &self.msg.subject
    }

    fn payload(&self) -> &Bytes {
        &self.msg.payload
    }

    fn stream_sequence(&self) -> u64 {
        self.msg.seq
    }

    fn delivery_count(&self) -> u64 {
        self.delivery_count
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.msg.headers
    }

    async fn ack(&self) -> Result<()> {
        // Acked messages are simply not re-queued; nothing to do.
        Ok(())
    }

    async fn nak(&self, _delay: Option<Duration>) -> Result<()> {
        let mut inner = self.inner.lock();
        let next_count = self.delivery_count + 1;
        let max_deliver = inner
            .streams
            .get(&self.stream)
            .and_then(|s| s.consumers.get(&self.durable_name))
            .map(|c| c.policy.max_deliver)
            .unwrap_or(i64::MAX);

        if max_deliver > 0 && next_count as i64 > max_deliver {
            let advisory = MaxDeliveriesAdvisory {
                stream: self.stream.clone(),
                consumer: self.durable_name.clone(),
                stream_seq: self.msg.seq,
                deliveries: next_count,
            };
            let _ = inner.advisory_tx.send(advisory);
            return Ok(());
        }

        if let Some(stream_state) = inner.streams.get_mut(&self.stream) {
            if let Some(consumer) = stream_state.consumers.get_mut(&self.durable_name) {
                consumer.redeliver.push_back((self.msg.seq, next_count));
            }
        }
        Ok(())
    }

    async fn term(&self) -> Result<()> {
        // Poisoned: drop it from redelivery consideration permanently.
        // Already not re-queued (it only reaches redeliver via `nak`), so
        // terming a freshly-fetched message is a no-op here.
        Ok(())
    }
}

struct InMemoryAdvisorySubscription {
    rx: mpsc::UnboundedReceiver<MaxDeliveriesAdvisory>,
}

#[async_trait]
impl AdvisorySubscription for InMemoryAdvisorySubscription {
    async fn next(&mut self) -> Result<Option<MaxDeliveriesAdvisory>> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(filter: &str, max_deliver: i64) -> ConsumerPolicy {
        ConsumerPolicy {
            filter_subject: filter.to_string(),
            ack_wait: Duration::from_secs(30),
            max_ack_pending: 1000,
            max_deliver,
        }
    }

    #[tokio::test]
    async fn publish_then_fetch_roundtrips_payload() {
        let broker = InMemoryBroker::new();
        broker
            .ensure_stream(StreamConfig {
                name: "EVENTS".into(),
                subjects: vec!["events.>".into()],
                max_age: Duration::from_secs(1),
                max_bytes: None,
            })
            .await
            .unwrap();

        broker
            .publish("events.demo.screen.view", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let consumer = broker
            .subscribe("EVENTS", "warehouse-sink", policy(">", 5))
            .await
            .unwrap();
        let batch = consumer.fetch(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload().as_ref(), b"hello");
        assert_eq!(batch[0].delivery_count(), 1);
    }

    #[tokio::test]
    async fn nak_redelivers_with_incremented_delivery_count() {
        let broker = InMemoryBroker::new();
        broker
            .ensure_stream(StreamConfig {
                name: "EVENTS".into(),
                subjects: vec!["events.>".into()],
                max_age: Duration::from_secs(1),
                max_bytes: None,
            })
            .await
            .unwrap();
        broker
            .publish("events.demo.screen.view", Bytes::from_static(b"hi"))
            .await
            .unwrap();

        let consumer = broker
            .subscribe("EVENTS", "warehouse-sink", policy(">", 5))
            .await
            .unwrap();
        let batch = consumer.fetch(10, Duration::from_millis(10)).await.unwrap();
        batch[0].nak(None).await.unwrap();

        let redelivered = consumer.fetch(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].delivery_count(), 2);
    }

    #[tokio::test]
    async fn exceeding_max_deliver_emits_advisory_instead_of_redelivering() {
        let broker = InMemoryBroker::new();
        broker
            .ensure_stream(StreamConfig {
                name: "EVENTS".into(),
                subjects: vec!["events.>".into()],
                max_age: Duration::from_secs(1),
                max_bytes: None,
            })
            .await
            .unwrap();
        broker
            .publish("events.demo.screen.view", Bytes::from_static(b"poison"))
            .await
            .unwrap();

        let consumer = broker
            .subscribe("EVENTS", "warehouse-sink", policy(">", 1))
            .await
            .unwrap();
        let mut advisories = broker.advisories().await.unwrap();

        let batch = consumer.fetch(10, Duration::from_millis(10)).await.unwrap();
        batch[0].nak(None).await.unwrap();

        let advisory = advisories.next().await.unwrap().expect("advisory emitted");
        assert_eq!(advisory.deliveries, 2);
        assert_eq!(advisory.consumer, "warehouse-sink");

        let redelivered = consumer.fetch(10, Duration::from_millis(10)).await.unwrap();
        assert!(redelivered.is_empty());
    }
}
