//! NATS JetStream implementation of [`crate::Broker`].
//!
//! Connection setup follows a fixed auth precedence — creds file > token
//! > user/password > none — over JetStream's pull-consumer / ack-wait /
//! advisory model.

use crate::error::{BrokerError, Result};
use crate::{
    AdvisorySubscription, Broker, BrokerMessage, ConsumerPolicy, MaxDeliveriesAdvisory,
    PublishAck, PullConsumer, RawMessage, StreamConfig,
};
use async_nats::jetstream::{self, consumer::pull, stream::DiscardPolicy};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

/// Authentication options for connecting to NATS.
#[derive(Debug, Default)]
pub struct NatsAuth {
    pub token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub creds_path: Option<String>,
}

pub struct NatsBroker {
    jetstream: jetstream::Context,
    client: async_nats::Client,
}

impl NatsBroker {
    pub async fn connect(url: &str, auth: NatsAuth) -> Result<Self> {
        let opts = build_connect_options(auth).await;
        let client = opts
            .connect(url)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        let jetstream = jetstream::new(client.clone());
        Ok(Self { jetstream, client })
    }
}

async fn build_connect_options(auth: NatsAuth) -> async_nats::ConnectOptions {
    if let Some(path) = auth.creds_path {
        if let Ok(opts) = async_nats::ConnectOptions::with_credentials_file(path).await {
            return opts;
        }
    }
    if let Some(token) = auth.token {
        return async_nats::ConnectOptions::new().token(token);
    }
    if let Some(user) = auth.user {
        let password = auth.password.unwrap_or_default();
        return async_nats::ConnectOptions::new().user_and_password(user, password);
    }
    async_nats::ConnectOptions::new()
}

#[async_trait]
impl Broker for NatsBroker {
    async fn ensure_stream(&self, config: StreamConfig) -> Result<()> {
        self.jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: config.name,
                subjects: config.subjects,
                max_age: config.max_age,
                max_bytes: config.max_bytes.unwrap_or(-1),
                discard: DiscardPolicy::Old,
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishAck> {
        let ack = self
            .jetstream
            .publish(subject.to_owned(), payload)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(PublishAck {
            stream: ack.stream,
            sequence: ack.sequence,
        })
    }

    async fn publish_with_headers(
        &self,
        subject: &str,
        headers: HashMap<String, String>,
        payload: Bytes,
    ) -> Result<PublishAck> {
        let mut nats_headers = async_nats::HeaderMap::new();
        for (name, value) in headers {
            nats_headers.insert(name, value);
        }
        let ack = self
            .jetstream
            .publish_with_headers(subject.to_owned(), nats_headers, payload)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(PublishAck {
            stream: ack.stream,
            sequence: ack.sequence,
        })
    }

    async fn subscribe(
        &self,
        stream: &str,
        durable_name: &str,
        policy: ConsumerPolicy,
    ) -> Result<Box<dyn PullConsumer>> {
        let stream = self
            .jetstream
            .get_stream(stream)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                durable_name,
                pull::Config {
                    durable_name: Some(durable_name.to_owned()),
                    filter_subject: policy.filter_subject,
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: policy.ack_wait,
                    max_deliver: policy.max_deliver,
                    max_ack_pending: policy.max_ack_pending,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        Ok(Box::new(NatsPullConsumer { consumer }))
    }

    async fn get_msg(&self, stream: &str, seq: u64) -> Result<RawMessage> {
        let stream = self
            .jetstream
            .get_stream(stream)
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        let raw = stream
            .get_raw_message(seq)
            .await
            .map_err(|_| BrokerError::NotFound {
                stream: stream.cached_info().config.name.clone(),
                seq,
            })?;

        let mut headers = HashMap::new();
        if let Some(hdrs) = &raw.headers {
            for (name, values) in hdrs.iter() {
                if let Some(value) = values.iter().next() {
                    headers.insert(name.to_string(), value.to_string());
                }
            }
        }

        Ok(RawMessage {
            subject: raw.subject.to_string(),
            payload: raw.payload,
            headers,
        })
    }

    async fn advisories(&self) -> Result<Box<dyn AdvisorySubscription>> {
        let sub = self
            .client
            .subscribe("$JS.EVENT.ADVISORY.CONSUMER.MAX_DELIVERIES.>".to_owned())
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(Box::new(NatsAdvisorySubscription { sub }))
    }
}

struct NatsPullConsumer {
    consumer: jetstream::consumer::Consumer<pull::Config>,
}

#[async_trait]
impl PullConsumer for NatsPullConsumer {
    async fn fetch(&self, n: usize, max_wait: Duration) -> Result<Vec<Box<dyn BrokerMessage>>> {
        use futures::StreamExt;

        let mut batch = self
            .consumer
            .fetch()
            .max_messages(n)
            .expires(max_wait.as_millis() as u64)
            .messages()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        let mut out = Vec::with_capacity(n);
        while let Some(msg) = batch.next().await {
            match msg {
                Ok(msg) => {
                    let headers = msg
                        .headers
                        .as_ref()
                        .map(|hdrs| {
                            hdrs.iter()
                                .filter_map(|(name, values)| {
                                    values
                                        .iter()
                                        .next()
                                        .map(|v| (name.to_string(), v.to_string()))
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    out.push(Box::new(NatsBrokerMessage { inner: msg, headers })
                        as Box<dyn BrokerMessage>)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "broker: malformed message in pull batch, skipping");
                }
            }
        }
        Ok(out)
    }
}

struct NatsBrokerMessage {
    inner: jetstream::Message,
    headers: HashMap<String, String>,
}

#[async_trait]
impl BrokerMessage for NatsBrokerMessage {
    fn subject(&self) -> &str {
        self.inner.subject.as_str()
    }

    fn payload(&self) -> &Bytes {
        &self.inner.payload
    }

    fn stream_sequence(&self) -> u64 {
        self.inner
            .info()
            .map(|info| info.stream_sequence)
            .unwrap_or_default()
    }

    fn delivery_count(&self) -> u64 {
        self.inner
            .info()
            .map(|info| info.delivered as u64)
            .unwrap_or(1)
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    async fn ack(&self) -> Result<()> {
        self.inner
            .ack()
            .await
            .map_err(|e| BrokerError::AckFailed(e.to_string()))
    }

    async fn nak(&self, delay: Option<Duration>) -> Result<()> {
        let kind = match delay {
            Some(d) => jetstream::AckKind::Nak(Some(d)),
            None => jetstream::AckKind::Nak(None),
        };
        self.inner
            .ack_with(kind)
            .await
            .map_err(|e| BrokerError::AckFailed(e.to_string()))
    }

    async fn term(&self) -> Result<()> {
        self.inner
            .ack_with(jetstream::AckKind::Term)
            .await
            .map_err(|e| BrokerError::AckFailed(e.to_string()))
    }
}

struct NatsAdvisorySubscription {
    sub: async_nats::Subscriber,
}

#[async_trait]
impl AdvisorySubscription for NatsAdvisorySubscription {
    async fn next(&mut self) -> Result<Option<MaxDeliveriesAdvisory>> {
        use futures::StreamExt;
        match self.sub.next().await {
            None => Ok(None),
            Some(msg) => match serde_json::from_slice::<MaxDeliveriesAdvisory>(&msg.payload) {
                Ok(advisory) => Ok(Some(advisory)),
                Err(e) => {
                    tracing::warn!(error = %e, "broker: malformed max-deliveries advisory, skipping");
                    Ok(None)
                }
            },
        }
    }
}
