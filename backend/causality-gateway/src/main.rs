mod admin;
mod auth;
mod config;
mod error;
mod health;
mod ingest;
mod state;
mod wire;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use causality_apikey::ApiKeyStore;
use causality_broker::nats::{NatsAuth, NatsBroker};
use causality_broker::{Broker, StreamConfig};
use causality_dbpool::{create_pool, migrate, DbConfig};
use causality_dedup::{DedupConfig, Deduplicator};
use causality_ratelimit::{KeyedRateLimiter, RateLimitConfig};
use config::GatewayConfig;
use state::AppState;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug,causality_gateway=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting causality-gateway");

    let config = GatewayConfig::from_env();

    let mut db_config =
        DbConfig::from_env("causality-gateway").context("DATABASE_URL must be set")?;
    if !config.database_url.is_empty() {
        db_config.database_url = config.database_url.clone();
    }
    db_config.log_config();

    let db_pool = create_pool(db_config)
        .await
        .context("failed to create database pool")?;

    migrate(&db_pool, "./migrations")
        .await
        .context("failed to run database migrations")?;

    let broker = NatsBroker::connect(&config.broker_url, NatsAuth::default())
        .await
        .context("failed to connect to broker")?;
    broker
        .ensure_stream(StreamConfig {
            name: config.broker_stream_name.clone(),
            subjects: vec!["events.>".to_string(), "anomalies.>".to_string()],
            max_age: config.broker_stream_max_age,
            max_bytes: config.broker_stream_max_bytes,
        })
        .await
        .context("failed to ensure event stream")?;
    let broker: Arc<dyn Broker> = Arc::new(broker);

    let dedup = Deduplicator::spawn(
        DedupConfig {
            window: config.dedup_window,
            expected_inserts_per_window: config.dedup_capacity,
            false_positive_rate: config.dedup_fp_rate,
        },
        CancellationToken::new(),
    );

    let rate_limiter = KeyedRateLimiter::new(RateLimitConfig {
        requests_per_second: config.rate_limit_rps,
        burst_size: config.rate_limit_burst,
    });

    let registry = prometheus::Registry::new();
    let dedup_drops_total = prometheus::IntCounter::new(
        "causality_gateway_dedup_drops_total",
        "envelopes dropped by the gateway's process-local dedup filter",
    )?;
    let accepted_total = prometheus::IntCounter::new(
        "causality_gateway_accepted_total",
        "envelopes accepted and published to the broker",
    )?;
    registry.register(Box::new(dedup_drops_total.clone()))?;
    registry.register(Box::new(accepted_total.clone()))?;

    let http_addr = config.http_addr.clone();
    let state = web::Data::new(AppState {
        config,
        broker,
        api_keys: ApiKeyStore::new(db_pool),
        dedup,
        rate_limiter,
        registry,
        dedup_drops_total,
        accepted_total,
    });

    tracing::info!(addr = %http_addr, "starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health::health))
            .route("/ready", web::get().to(health::ready))
            .route("/metrics", web::get().to(health::metrics))
            .route("/v1/events/ingest", web::post().to(ingest::ingest_single))
            .route("/v1/events/batch", web::post().to(ingest::ingest_batch))
            .route("/api/admin/keys", web::post().to(admin::create_key))
            .route("/api/admin/keys", web::get().to(admin::list_keys))
            .route("/api/admin/keys/{id}", web::delete().to(admin::revoke_key))
    })
    .bind(&http_addr)
    .context("failed to bind HTTP server")?
    .run()
    .await
    .context("HTTP server error")
}
