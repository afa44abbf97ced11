//! `alerting` durable consumer: consumes `anomalies.>`, matches each
//! [`AnomalyEvent`] against the same rule cache the analysis-engine
//! consumer uses, and enqueues webhook deliveries for the rules that
//! match. Reuses
//! [`crate::rules::Rule::matches_scope`] directly rather than
//! `Rule::matches`, since an anomaly event isn't an [`causality_contracts::Envelope`]
//! — it's a derived signal scoped by `app_id` and an anomaly `kind`
//! rather than an event category/type.

use crate::consumer::AnomalyEvent;
use crate::repo;
use crate::rules::{ActionKind, RuleCache};
use causality_broker::{Broker, BrokerMessage, PullConsumer};
use causality_outbox::{NewDelivery, WebhookDeliveryStore};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The scoping category used for anomaly events in the rule cache — a
/// rule targeting anomalies sets `event_category = "anomaly"` and
/// `event_type` to the anomaly kind (`"threshold"`, `"rate"`, `"count"`)
/// it wants to react to, or leaves both unset to catch every anomaly.
const ANOMALY_CATEGORY: &str = "anomaly";

pub async fn run_alerting_consumer(
    consumer: Arc<dyn PullConsumer>,
    db_pool: PgPool,
    rule_cache: RuleCache,
    outbox: WebhookDeliveryStore,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("alerting consumer shutting down");
                break;
            }
            fetched = consumer.fetch(64, Duration::from_millis(1000)) => {
                let messages = match fetched {
                    Ok(messages) => messages,
                    Err(e) => {
                        warn!(error = %e, "alerting fetch failed, backing off");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        continue;
                    }
                };

                for message in messages {
                    handle_one(message.as_ref(), &db_pool, &rule_cache, &outbox).await;
                }
            }
        }
    }
}

async fn handle_one(
    message: &dyn BrokerMessage,
    db_pool: &PgPool,
    rule_cache: &RuleCache,
    outbox: &WebhookDeliveryStore,
) {
    match process(message, db_pool, rule_cache, outbox).await {
        Ok(()) => {
            if let Err(e) = message.ack().await {
                warn!(error = %e, "failed to ack alerting message after successful processing");
            }
        }
        Err(e) => {
            warn!(error = %e, "alerting handler failed, nacking for redelivery");
            if let Err(e) = message.nak(None).await {
                warn!(error = %e, "failed to nak alerting message");
            }
        }
    }
}

async fn process(
    message: &dyn BrokerMessage,
    db_pool: &PgPool,
    rule_cache: &RuleCache,
    outbox: &WebhookDeliveryStore,
) -> anyhow::Result<()> {
    let event: AnomalyEvent = serde_json::from_slice(message.payload())?;
    let value = serde_json::to_value(&event)?;

    let matched: Vec<_> = rule_cache
        .snapshot()
        .iter()
        .filter(|rule| rule.matches_scope(&event.app_id, ANOMALY_CATEGORY, event.kind, &value))
        .cloned()
        .collect();

    if matched.is_empty() {
        return Ok(());
    }

    let mut tx = db_pool.begin().await?;
    for rule in &matched {
        for action in &rule.actions {
            if action.kind != ActionKind::Webhook {
                continue;
            }
            let webhook = repo::get_webhook(db_pool, action.webhook_id).await?;
            let Some(webhook) = webhook else {
                warn!(webhook_id = %action.webhook_id, rule_id = %rule.id, "anomaly rule references unknown webhook, skipping action");
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
                        anomaly_config_id: Some(event.anomaly_config_id),
                        payload: value.clone(),
                        max_attempts: webhook.max_attempts,
                    },
                )
                .await?;
        }
    }
    tx.commit().await?;

    Ok(())
}
