mod admin;
mod alerting;
mod anomaly;
mod config;
mod consumer;
mod dispatcher;
mod error;
mod health;
mod repo;
mod rules;
mod state;
mod webhook_auth;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use anomaly::AnomalyEngine;
use causality_broker::nats::{NatsAuth, NatsBroker};
use causality_broker::{Broker, ConsumerPolicy, StreamConfig};
use causality_dbpool::{create_pool, migrate, DbConfig};
use causality_outbox::{OutboxConfig, OutboxMetrics, WebhookDeliveryStore};
use config::ReactionConfig;
use rules::RuleCache;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug,causality_reaction=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting causality-reaction");

    let config = ReactionConfig::from_env();

    let mut db_config =
        DbConfig::from_env("causality-reaction").context("DATABASE_URL must be set")?;
    if !config.database_url.is_empty() {
        db_config.database_url = config.database_url.clone();
    }
    db_config.log_config();

    let db_pool = create_pool(db_config)
        .await
        .context("failed to create database pool")?;

    // Only the webhook_deliveries table is migrated here; rules, webhooks,
    // and anomaly_configurations are owned by the admin UI's own schema.
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
            max_age: Duration::from_secs(7 * 24 * 3600),
            max_bytes: None,
        })
        .await
        .context("failed to ensure event stream")?;
    let broker: Arc<dyn Broker> = Arc::new(broker);

    let analysis_consumer = Arc::from(
        broker
            .subscribe(
                &config.broker_stream_name,
                "analysis-engine",
                ConsumerPolicy {
                    filter_subject: "events.>".to_string(),
                    ack_wait: config.analysis_ack_wait,
                    max_ack_pending: config.analysis_max_ack_pending,
                    max_deliver: config.analysis_max_deliver,
                },
            )
            .await
            .context("failed to subscribe analysis-engine consumer")?,
    );

    let alerting_consumer = Arc::from(
        broker
            .subscribe(
                &config.broker_stream_name,
                "alerting",
                ConsumerPolicy {
                    filter_subject: "anomalies.>".to_string(),
                    ack_wait: config.alerting_ack_wait,
                    max_ack_pending: config.alerting_max_ack_pending,
                    max_deliver: config.alerting_max_deliver,
                },
            )
            .await
            .context("failed to subscribe alerting consumer")?,
    );

    let rules = repo::load_rules(&db_pool)
        .await
        .context("failed to load initial rule set")?;
    let rule_cache = RuleCache::new(rules);

    let anomaly_configs = repo::load_anomaly_configs(&db_pool)
        .await
        .context("failed to load initial anomaly configs")?;
    let anomaly_engine = Arc::new(AnomalyEngine::new(anomaly_configs));

    let outbox_config = OutboxConfig::from_env();
    let outbox = WebhookDeliveryStore::new(db_pool.clone(), outbox_config.clone());

    let registry = prometheus::Registry::new();
    let outbox_metrics = Arc::new(
        OutboxMetrics::new(&registry).context("failed to register outbox metrics")?,
    );

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    {
        let rule_cache = rule_cache.clone();
        let pool = db_pool.clone();
        let interval = config.rule_refresh_interval;
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match repo::load_rules(&pool).await {
                            Ok(rules) => rule_cache.refresh(rules),
                            Err(e) => tracing::warn!(error = %e, "failed to refresh rule cache"),
                        }
                    }
                }
            }
        }));
    }

    {
        let anomaly_engine = anomaly_engine.clone();
        let pool = db_pool.clone();
        let interval = config.rule_refresh_interval;
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match repo::load_anomaly_configs(&pool).await {
                            Ok(configs) => anomaly_engine.refresh(configs),
                            Err(e) => tracing::warn!(error = %e, "failed to refresh anomaly configs"),
                        }
                    }
                }
            }
        }));
    }

    tasks.push(tokio::spawn(consumer::run_analysis_consumer(
        analysis_consumer,
        broker.clone(),
        db_pool.clone(),
        rule_cache.clone(),
        anomaly_engine.clone(),
        outbox.clone(),
        shutdown.clone(),
    )));

    tasks.push(tokio::spawn(alerting::run_alerting_consumer(
        alerting_consumer,
        db_pool.clone(),
        rule_cache.clone(),
        outbox.clone(),
        shutdown.clone(),
    )));

    tasks.push(tokio::spawn(dispatcher::run_dispatcher_workers(
        config.dispatcher_workers,
        Duration::from_millis(outbox_config.poll_interval_ms),
        outbox.clone(),
        db_pool.clone(),
        outbox_metrics.clone(),
        shutdown.clone(),
    )));

    let http_addr = config.http_addr.clone();
    let state = web::Data::new(AppState {
        config: config.clone(),
        db_pool: db_pool.clone(),
        rule_cache,
        anomaly_engine,
        outbox,
        outbox_metrics,
        registry,
    });

    tracing::info!(addr = %http_addr, "starting reaction engine admin HTTP server");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health::health))
            .route("/ready", web::get().to(health::ready))
            .route("/metrics", web::get().to(health::metrics))
            .route("/admin/outbox/stats", web::get().to(admin::outbox_stats))
            .route(
                "/admin/deliveries/{id}/retry",
                web::post().to(admin::retry_delivery),
            )
    })
    .bind(&http_addr)
    .context("failed to bind HTTP server")?
    .run();

    tokio::select! {
        result = server => result.context("HTTP server error")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, draining");
        }
    }

    shutdown.cancel();
    let drain = async {
        for task in tasks {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(config.shutdown_timeout, drain)
        .await
        .is_err()
    {
        tracing::warn!("shutdown timeout exceeded; background tasks were not fully drained");
    }

    tracing::info!("causality-reaction stopped");
    Ok(())
}
