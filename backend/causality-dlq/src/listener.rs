//! Advisory listener → DLQ republish. Subscribes to the broker's
//! max-delivery advisory subject, retrieves the original message by
//! sequence, and republishes it to `dlq.<original-subject>` on the DLQ
//! stream with `X-DLQ-*` headers plus passthrough of the original
//! message's own headers.

use causality_broker::{Broker, MaxDeliveriesAdvisory};
use prometheus::IntGaugeVec;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub async fn run_listener(
    broker: Arc<dyn Broker>,
    dlq_stream_name: String,
    depth: IntGaugeVec,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut advisories = broker.advisories().await?;

    loop {
        let advisory = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("DLQ listener shutting down");
                break;
            }
            next = advisories.next() => next,
        };

        match advisory {
            Ok(Some(advisory)) => {
                handle_advisory(&broker, &dlq_stream_name, &depth, advisory).await;
            }
            Ok(None) => {
                debug!("advisory subscription closed, stopping DLQ listener");
                break;
            }
            Err(e) => {
                // The source message is already poisoned (term'd by its
                // consumer); a failure here is only ever the advisory
                // transport itself, surfaced as a warning.
                warn!(error = %e, "failed to read next DLQ advisory");
            }
        }
    }

    Ok(())
}

async fn handle_advisory(
    broker: &Arc<dyn Broker>,
    dlq_stream_name: &str,
    depth: &IntGaugeVec,
    advisory: MaxDeliveriesAdvisory,
) {
    let raw = match broker.get_msg(&advisory.stream, advisory.stream_seq).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(
                stream = %advisory.stream,
                seq = advisory.stream_seq,
                error = %e,
                "failed to fetch original message for DLQ republish"
            );
            return;
        }
    };

    let mut headers: HashMap<String, String> = raw.headers.clone();
    headers.insert("X-DLQ-Original-Subject".to_string(), raw.subject.clone());
    headers.insert("X-DLQ-Original-Stream".to_string(), advisory.stream.clone());
    headers.insert("X-DLQ-Original-Consumer".to_string(), advisory.consumer.clone());
    headers.insert(
        "X-DLQ-Original-Sequence".to_string(),
        advisory.stream_seq.to_string(),
    );
    headers.insert(
        "X-DLQ-Original-Deliveries".to_string(),
        advisory.deliveries.to_string(),
    );

    let dlq_subject = format!("dlq.{}", raw.subject);
    match broker
        .publish_with_headers(&dlq_subject, headers, raw.payload)
        .await
    {
        Ok(ack) => {
            depth
                .with_label_values(&[&advisory.consumer, &raw.subject])
                .inc();
            debug!(
                subject = %dlq_subject,
                stream = %ack.stream,
                sequence = ack.sequence,
                "republished poisoned message to DLQ"
            );
        }
        Err(e) => {
            warn!(
                subject = %dlq_subject,
                stream = %dlq_stream_name,
                error = %e,
                "failed to republish message to DLQ stream"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use causality_broker::memory::InMemoryBroker;
    use causality_broker::{ConsumerPolicy, StreamConfig};
    use std::time::Duration as StdDuration;

    fn registry_gauge() -> (prometheus::Registry, IntGaugeVec) {
        let registry = prometheus::Registry::new();
        let gauge = IntGaugeVec::new(
            prometheus::Opts::new("causality_dlq_depth", "DLQ republish depth"),
            &["consumer", "subject"],
        )
        .unwrap();
        registry.register(Box::new(gauge.clone())).unwrap();
        (registry, gauge)
    }

    #[tokio::test]
    async fn advisory_triggers_republish_with_dlq_headers() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
        broker
            .ensure_stream(StreamConfig {
                name: "EVENTS".into(),
                subjects: vec!["events.>".into()],
                max_age: StdDuration::from_secs(1),
                max_bytes: None,
            })
            .await
            .unwrap();
        broker
            .publish("events.demo.screen.view", Bytes::from_static(b"poison"))
            .await
            .unwrap();

        let consumer = broker
            .subscribe(
                "EVENTS",
                "warehouse-sink",
                ConsumerPolicy {
                    filter_subject: ">".into(),
                    ack_wait: StdDuration::from_secs(30),
                    max_ack_pending: 10,
                    max_deliver: 1,
                },
            )
            .await
            .unwrap();

        let batch = consumer.fetch(10, StdDuration::from_millis(10)).await.unwrap();
        batch[0].nak(None).await.unwrap();

        let (_, gauge) = registry_gauge();
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let broker_clone = broker.clone();
        let gauge_clone = gauge.clone();
        let handle = tokio::spawn(async move {
            run_listener(broker_clone, "CAUSALITY_DLQ".into(), gauge_clone, shutdown_clone).await
        });

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        shutdown.cancel();
        let _ = handle.await;

        assert_eq!(gauge.with_label_values(&["warehouse-sink", "events.demo.screen.view"]).get(), 1);
    }
}
