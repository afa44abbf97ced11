mod config;
mod listener;

use causality_broker::nats::{NatsAuth, NatsBroker};
use causality_broker::{Broker, StreamConfig};
use config::DlqConfig;
use prometheus::IntGaugeVec;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,causality_dlq=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting causality-dlq");

    let config = DlqConfig::from_env();

    let broker = NatsBroker::connect(&config.broker_url, NatsAuth::default()).await?;
    broker
        .ensure_stream(StreamConfig {
            name: config.broker_stream_name.clone(),
            subjects: vec!["events.>".to_string(), "anomalies.>".to_string()],
            max_age: Duration::from_secs(7 * 24 * 3_600),
            max_bytes: None,
        })
        .await?;
    broker
        .ensure_stream(StreamConfig {
            name: config.dlq_stream_name.clone(),
            subjects: vec!["dlq.>".to_string()],
            max_age: config.dlq_max_age,
            max_bytes: None,
        })
        .await?;
    let broker: Arc<dyn Broker> = Arc::new(broker);

    let registry = prometheus::Registry::new();
    let depth = IntGaugeVec::new(
        prometheus::Opts::new(
            "causality_dlq_depth",
            "Messages republished to the DLQ stream, by original consumer and subject",
        ),
        &["consumer", "subject"],
    )?;
    registry.register(Box::new(depth.clone()))?;

    let shutdown = CancellationToken::new();
    let shutdown_on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_on_signal.cancel();
        }
    });

    listener::run_listener(broker, config.dlq_stream_name.clone(), depth, shutdown).await?;

    tracing::info!("causality-dlq stopped");
    Ok(())
}
