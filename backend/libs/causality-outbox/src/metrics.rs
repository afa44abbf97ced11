//! Prometheus gauges for outbox health: pending depth, oldest-pending
//! age, delivered/dead-lettered counters.

use prometheus::{IntCounter, IntGauge, Registry};

#[derive(Clone)]
pub struct OutboxMetrics {
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
    pub delivered_total: IntCounter,
    pub dead_lettered_total: IntCounter,
}

impl OutboxMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let pending = IntGauge::new(
            "causality_outbox_pending",
            "Number of webhook delivery rows awaiting dispatch",
        )?;
        let oldest_pending_age_seconds = IntGauge::new(
            "causality_outbox_oldest_pending_age_seconds",
            "Age in seconds of the oldest pending webhook delivery row",
        )?;
        let delivered_total = IntCounter::new(
            "causality_outbox_delivered_total",
            "Total webhook deliveries that reached 2xx",
        )?;
        let dead_lettered_total = IntCounter::new(
            "causality_outbox_dead_lettered_total",
            "Total webhook deliveries that exhausted their attempt budget",
        )?;

        registry.register(Box::new(pending.clone()))?;
        registry.register(Box::new(oldest_pending_age_seconds.clone()))?;
        registry.register(Box::new(delivered_total.clone()))?;
        registry.register(Box::new(dead_lettered_total.clone()))?;

        Ok(Self {
            pending,
            oldest_pending_age_seconds,
            delivered_total,
            dead_lettered_total,
        })
    }
}
