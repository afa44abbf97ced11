use crate::config::GatewayConfig;
use causality_apikey::ApiKeyStore;
use causality_broker::Broker;
use causality_dedup::Deduplicator;
use causality_ratelimit::KeyedRateLimiter;
use std::sync::Arc;

pub struct AppState {
    pub config: GatewayConfig,
    pub broker: Arc<dyn Broker>,
    pub api_keys: ApiKeyStore,
    pub dedup: Deduplicator,
    pub rate_limiter: KeyedRateLimiter,
    pub registry: prometheus::Registry,
    pub dedup_drops_total: prometheus::IntCounter,
    pub accepted_total: prometheus::IntCounter,
}
