//! `analysis-engine` durable consumer: matches every envelope against the
//! rule cache, enqueues webhook deliveries for matching actions in the
//! same transaction that ACKs the message, and folds the envelope into
//! every applicable anomaly window.

use crate::anomaly::AnomalyEngine;
use crate::repo;
use crate::rules::{envelope_to_value, ActionKind, RuleCache};
use causality_broker::{Broker, BrokerMessage, PullConsumer};
use causality_contracts::Envelope;
use causality_outbox::{NewDelivery, WebhookDeliveryStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Published to `anomalies.<config_id>` when an aggregate crosses its
/// threshold. Deliberately not the `Envelope` type: an anomaly is a
/// derived signal, not a client-originated event, and carries the
/// aggregate that tripped it rather than a payload variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub anomaly_config_id: Uuid,
    pub app_id: String,
    pub source_event_type: String,
    pub kind: &'static str,
    pub aggregate: f64,
    pub threshold: f64,
    pub triggered_at_ms: i64,
}

pub async fn run_analysis_consumer(
    consumer: Arc<dyn PullConsumer>,
    broker: Arc<dyn Broker>,
    db_pool: PgPool,
    rule_cache: RuleCache,
    anomaly_engine: Arc<AnomalyEngine>,
    outbox: WebhookDeliveryStore,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("analysis-engine consumer shutting down");
                break;
            }
            fetched = consumer.fetch(64, Duration::from_millis(1000)) => {
                let messages = match fetched {
                    Ok(messages) => messages,
                    Err(e) => {
                        warn!(error = %e, "analysis-engine fetch failed, backing off");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        continue;
                    }
                };

                for message in messages {
                    handle_one(
                        message.as_ref(),
                        &broker,
                        &db_pool,
                        &rule_cache,
                        &anomaly_engine,
                        &outbox,
                    )
                    .await;
                }
            }
        }
    }
}

async fn handle_one(
    message: &dyn BrokerMessage,
    broker: &Arc<dyn Broker>,
    db_pool: &PgPool,
    rule_cache: &RuleCache,
    anomaly_engine: &Arc<AnomalyEngine>,
    outbox: &WebhookDeliveryStore,
) {
    match process(message, broker, db_pool, rule_cache, anomaly_engine, outbox).await {
        Ok(()) => {
            if let Err(e) = message.ack().await {
                warn!(error = %e, "failed to ack reaction-engine message after successful processing");
            }
        }
        Err(e) => {
            // Rule evaluation is pure, so a failure here is always an
            // outbox/broker transient (DB down, broker unreachable). NAK
            // with the broker's configured backoff rather than a
            // hand-picked delay.
            warn!(error = %e, "reaction-engine handler failed, nacking for redelivery");
            if let Err(e) = message.nak(None).await {
                warn!(error = %e, "failed to nak reaction-engine message");
            }
        }
    }
}

async fn process(
    message: &dyn BrokerMessage,
    broker: &Arc<dyn Broker>,
    db_pool: &PgPool,
    rule_cache: &RuleCache,
    anomaly_engine: &Arc<AnomalyEngine>,
    outbox: &WebhookDeliveryStore,
) -> anyhow::Result<()> {
    let envelope: Envelope = serde_json::from_slice(message.payload())?;

    let matched = rule_cache.matching(&envelope);
    if !matched.is_empty() {
        let payload = envelope_to_value(&envelope);
        let mut tx = db_pool.begin().await?;
        for rule in &matched {
            for action in &rule.actions {
                if action.kind != ActionKind::Webhook {
                    continue;
                }
                let webhook = repo::get_webhook(db_pool, action.webhook_id).await?;
                let Some(webhook) = webhook else {
                    warn!(webhook_id = %action.webhook_id, rule_id = %rule.id, "rule references unknown webhook, skipping action");
                    continue;
                };
                if !webhook.enabled {
                    continue;
                }
                outbox
                    .enqueue(
                        &mut tx,
                        NewDelivery {
                            webhook_id: webhook.id,
                            rule_id: Some(rule.id),
                            anomaly_config_id: None,
                            payload: payload.clone(),
                            max_attempts: webhook.max_attempts,
                        },
                    )
                    .await?;
            }
        }
        tx.commit().await?;
    }

    let crossed = anomaly_engine.fold(&envelope);
    if !crossed.is_empty() {
        let configs = anomaly_engine.snapshot();
        let (_, source_event_type) = envelope.category_and_type();
        for (config_id, aggregate) in crossed {
            let Some(config) = configs.iter().find(|c| c.id == config_id) else {
                continue;
            };
            let event = AnomalyEvent {
                anomaly_config_id: config.id,
                app_id: envelope.app_id.clone(),
                source_event_type: source_event_type.clone(),
                kind: match config.kind {
                    crate::anomaly::AnomalyKind::Threshold => "threshold",
                    crate::anomaly::AnomalyKind::Rate => "rate",
                    crate::anomaly::AnomalyKind::Count => "count",
                },
                aggregate,
                threshold: config.threshold,
                triggered_at_ms: Utc::now().timestamp_millis(),
            };
            let subject = format!("anomalies.{}", config.id);
            let bytes = serde_json::to_vec(&event)?;
            broker.publish(&subject, bytes.into()).await?;
        }
    }

    Ok(())
}
