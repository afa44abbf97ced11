//! The outbox itself: a Postgres table leased with `FOR UPDATE SKIP
//! LOCKED` so any number of dispatcher workers can share it without
//! contention. This crate owns row leasing and state transitions; the
//! caller owns the actual webhook POST.

use crate::config::OutboxConfig;
use crate::error::{OutboxError, Result};
use crate::metrics::OutboxMetrics;
use crate::model::{DeliveryRow, DeliveryStatus, NewDelivery, WebhookDelivery};
use causality_resilience::full_jitter;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct WebhookDeliveryStore {
    pool: PgPool,
    config: OutboxConfig,
}

impl WebhookDeliveryStore {
    pub fn new(pool: PgPool, config: OutboxConfig) -> Self {
        Self { pool, config }
    }

    /// Insert a delivery row as part of the caller's own transaction, so
    /// it commits atomically with whatever else the caller is doing in
    /// that unit of effect — the delivery row is created before the
    /// triggering message is acked.
    pub async fn enqueue(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        delivery: NewDelivery,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries
                (id, webhook_id, rule_id, anomaly_config_id, payload, status,
                 attempts, max_attempts, next_attempt_at, created_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(delivery.webhook_id)
        .bind(delivery.rule_id)
        .bind(delivery.anomaly_config_id)
        .bind(delivery.payload)
        .bind(delivery.max_attempts)
        .execute(&mut **tx)
        .await?;

        Ok(id)
    }

    /// Lease up to `limit` eligible rows for dispatch, marking them
    /// `in_progress` atomically with the lease. `in_progress` rows are
    /// eligible again too: a worker that crashed
    /// mid-dispatch leaves its row locked only as long as its own
    /// transaction lives, so the next tick picks it back up.
    pub async fn lease_batch(&self) -> Result<Vec<WebhookDelivery>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, DeliveryRow>(
            r#"
            SELECT id, webhook_id, rule_id, anomaly_config_id, payload, status,
                   attempts, max_attempts, next_attempt_at, last_attempt_at,
                   last_error, last_status_code, created_at, delivered_at
            FROM webhook_deliveries
            WHERE status IN ('pending', 'in_progress') AND next_attempt_at <= NOW()
            ORDER BY next_attempt_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(self.config.batch_size)
        .fetch_all(&mut *tx)
        .await?;

        if rows.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = 'in_progress', last_attempt_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(count = rows.len(), "leased webhook deliveries for dispatch");
        Ok(rows.into_iter().map(WebhookDelivery::from).collect())
    }

    /// Mark a delivery as successfully dispatched on a 2xx response.
    pub async fn mark_delivered(&self, id: Uuid, status_code: i32) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = 'delivered', last_status_code = $2, delivered_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status_code)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::NotFound);
        }
        Ok(())
    }

    /// Non-2xx, timeout, or transport error: reschedule with full-jitter
    /// backoff, or terminate to dead-letter once `max_attempts` is
    /// exhausted.
    pub async fn mark_failed(
        &self,
        delivery: &WebhookDelivery,
        status_code: Option<i32>,
        error: String,
    ) -> Result<DeliveryStatus> {
        let attempts = delivery.attempts + 1;

        if attempts >= delivery.max_attempts {
            sqlx::query(
                r#"
                UPDATE webhook_deliveries
                SET status = 'dead_letter', attempts = $2, last_status_code = $3,
                    last_error = $4
                WHERE id = $1
                "#,
            )
            .bind(delivery.id)
            .bind(attempts)
            .bind(status_code)
            .bind(&error)
            .execute(&self.pool)
            .await?;

            warn!(delivery_id = %delivery.id, attempts, "webhook delivery dead-lettered");
            return Ok(DeliveryStatus::DeadLetter);
        }

        let backoff = full_jitter(
            attempts as u32,
            Duration::from_millis(self.config.backoff_base_ms),
            Duration::from_millis(self.config.backoff_cap_ms),
        );

        sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = 'pending', attempts = $2, last_status_code = $3,
                last_error = $4, next_attempt_at = NOW() + ($5 * INTERVAL '1 millisecond')
            WHERE id = $1
            "#,
        )
        .bind(delivery.id)
        .bind(attempts)
        .bind(status_code)
        .bind(&error)
        .bind(backoff.as_millis() as f64)
        .execute(&self.pool)
        .await?;

        Ok(DeliveryStatus::Pending)
    }

    /// Operator-driven "Retry" op: re-drive a dead-letter row back to
    /// pending with a clean attempt counter.
    pub async fn reset_to_pending(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = 'pending', attempts = 0, next_attempt_at = NOW(),
                last_error = NULL
            WHERE id = $1 AND status = 'dead_letter'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::NotFound);
        }
        Ok(())
    }

    /// Janitor sweep: delete terminal rows older than the configured
    /// retention.
    pub async fn delete_older_than(&self, retention: Duration) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap_or_default();
        let result = sqlx::query(
            r#"
            DELETE FROM webhook_deliveries
            WHERE status IN ('delivered', 'dead_letter')
              AND COALESCE(delivered_at, created_at) < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Refresh the pending-depth and oldest-pending-age gauges.
    pub async fn record_pending_metrics(&self, metrics: &OutboxMetrics) -> Result<()> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::BIGINT AS pending,
                   COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(created_at)))::BIGINT, 0) AS age_seconds
            FROM webhook_deliveries
            WHERE status IN ('pending', 'in_progress')
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let pending: i64 = row.try_get("pending").unwrap_or(0);
        let age: i64 = row.try_get("age_seconds").unwrap_or(0);
        metrics.pending.set(pending);
        metrics.oldest_pending_age_seconds.set(age);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_threshold_is_reached_at_max_attempts() {
        // attempts becomes max_attempts on the Nth failure, not N+1: a
        // row with max_attempts=3 dead-letters on its third failed
        // attempt, matching spec.md's worked example (§8.6).
        let max_attempts = 3;
        let mut attempts = 0;
        let mut dead_lettered = false;
        for _ in 0..max_attempts {
            attempts += 1;
            if attempts >= max_attempts {
                dead_lettered = true;
            }
        }
        assert!(dead_lettered);
        assert_eq!(attempts, 3);
    }
}
