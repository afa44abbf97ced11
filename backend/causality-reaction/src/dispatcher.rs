//! Webhook dispatcher: a pool of worker tasks that lease batches from
//! [`WebhookDeliveryStore`], POST each payload to its webhook's URL with
//! the configured auth, and report the outcome back to the store.

use crate::repo;
use crate::webhook_auth::apply_auth;
use causality_outbox::{OutboxMetrics, WebhookDeliveryStore};
use reqwest::Client;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub async fn run_dispatcher_workers(
    workers: usize,
    poll_interval: Duration,
    outbox: WebhookDeliveryStore,
    db_pool: PgPool,
    metrics: Arc<OutboxMetrics>,
    shutdown: CancellationToken,
) {
    let client = Client::new();
    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let outbox = outbox.clone();
        let db_pool = db_pool.clone();
        let client = client.clone();
        let metrics = metrics.clone();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            run_one_worker(worker_id, poll_interval, outbox, db_pool, client, metrics, shutdown)
                .await;
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "dispatcher worker task panicked");
        }
    }
}

async fn run_one_worker(
    worker_id: usize,
    poll_interval: Duration,
    outbox: WebhookDeliveryStore,
    db_pool: PgPool,
    client: Client,
    metrics: Arc<OutboxMetrics>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(worker_id, "dispatcher worker shutting down");
                break;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        let batch = match outbox.lease_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(worker_id, error = %e, "failed to lease webhook deliveries");
                continue;
            }
        };

        if batch.is_empty() {
            continue;
        }

        for delivery in batch {
            dispatch_one(&db_pool, &client, &outbox, &metrics, delivery).await;
        }
    }
}

async fn dispatch_one(
    db_pool: &PgPool,
    client: &Client,
    outbox: &WebhookDeliveryStore,
    metrics: &OutboxMetrics,
    delivery: causality_outbox::WebhookDelivery,
) {
    let webhook = match repo::get_webhook(db_pool, delivery.webhook_id).await {
        Ok(Some(webhook)) => webhook,
        Ok(None) => {
            warn!(delivery_id = %delivery.id, webhook_id = %delivery.webhook_id, "delivery references unknown webhook, dead-lettering");
            let _ = outbox
                .mark_failed(&delivery, None, "webhook no longer exists".to_string())
                .await;
            return;
        }
        Err(e) => {
            error!(delivery_id = %delivery.id, error = %e, "failed to load webhook for dispatch");
            return;
        }
    };

    let body = match serde_json::to_vec(&delivery.payload) {
        Ok(body) => body,
        Err(e) => {
            error!(delivery_id = %delivery.id, error = %e, "failed to serialize delivery payload");
            let _ = outbox
                .mark_failed(&delivery, None, format!("payload serialization failed: {e}"))
                .await;
            return;
        }
    };

    let timeout = Duration::from_millis(webhook.timeout_ms);
    let request = client
        .post(&webhook.url)
        .timeout(timeout)
        .header("Content-Type", "application/json")
        .body(body.clone());
    let request = apply_auth(request, &webhook, &body);

    match request.send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                if let Err(e) = outbox.mark_delivered(delivery.id, status.as_u16() as i32).await {
                    error!(delivery_id = %delivery.id, error = %e, "failed to mark delivery delivered");
                } else {
                    metrics.delivered_total.inc();
                }
            } else {
                let outcome = outbox
                    .mark_failed(
                        &delivery,
                        Some(status.as_u16() as i32),
                        format!("non-success status {status}"),
                    )
                    .await;
                if let Ok(causality_outbox::DeliveryStatus::DeadLetter) = outcome {
                    metrics.dead_lettered_total.inc();
                }
            }
        }
        Err(e) => {
            warn!(delivery_id = %delivery.id, webhook_id = %webhook.id, error = %e, "webhook request failed");
            let outcome = outbox.mark_failed(&delivery, None, e.to_string()).await;
            if let Ok(causality_outbox::DeliveryStatus::DeadLetter) = outcome {
                metrics.dead_lettered_total.inc();
            }
        }
    }
}
