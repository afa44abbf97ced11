use crate::anomaly::AnomalyEngine;
use crate::config::ReactionConfig;
use crate::rules::RuleCache;
use causality_outbox::{OutboxMetrics, WebhookDeliveryStore};
use sqlx::PgPool;
use std::sync::Arc;

pub struct AppState {
    pub config: ReactionConfig,
    pub db_pool: PgPool,
    pub rule_cache: RuleCache,
    pub anomaly_engine: Arc<AnomalyEngine>,
    pub outbox: WebhookDeliveryStore,
    pub outbox_metrics: Arc<OutboxMetrics>,
    pub registry: prometheus::Registry,
}
