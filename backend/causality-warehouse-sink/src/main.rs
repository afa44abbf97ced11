mod config;
mod fetcher;
mod partition;
mod sealer;

use causality_broker::nats::{NatsAuth, NatsBroker};
use causality_broker::{Broker, ConsumerPolicy};
use causality_objectstore::{ObjectStore, S3ObjectStore};
use config::SinkConfig;
use fetcher::FetcherConfig;
use partition::PartitionMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,causality_warehouse_sink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting causality-warehouse-sink");

    let config = SinkConfig::from_env();

    let broker = NatsBroker::connect(&config.broker_url, NatsAuth::default()).await?;
    broker
        .ensure_stream(causality_broker::StreamConfig {
            name: config.broker_stream_name.clone(),
            subjects: vec!["events.>".to_string(), "anomalies.>".to_string()],
            max_age: std::time::Duration::from_secs(7 * 24 * 3600),
            max_bytes: None,
        })
        .await?;

    let consumer: Arc<dyn causality_broker::PullConsumer> = Arc::from(
        broker
            .subscribe(
                &config.broker_stream_name,
                &config.durable_name,
                ConsumerPolicy {
                    filter_subject: ">".to_string(),
                    ack_wait: config.ack_wait,
                    max_ack_pending: config.max_ack_pending,
                    max_deliver: config.max_deliver,
                },
            )
            .await?,
    );

    let endpoint_override = if config.object_store_endpoint.is_empty() {
        None
    } else {
        Some(config.object_store_endpoint.clone())
    };
    let object_store: Arc<dyn ObjectStore> = Arc::new(
        S3ObjectStore::connect(config.object_store_bucket.clone(), endpoint_override).await,
    );

    let partitions = Arc::new(PartitionMap::new());
    let shutdown = CancellationToken::new();

    let fetcher_config = Arc::new(FetcherConfig {
        batch_size: config.fetch_batch_size,
        max_wait: config.fetch_max_wait,
        max_events_per_partition: config.batch_max_events,
        object_store_prefix: config.object_store_prefix.clone(),
        compression: config.compression,
    });

    let mut tasks = Vec::new();
    for id in 0..config.num_fetchers {
        tasks.push(tokio::spawn(fetcher::run_fetcher(
            id,
            consumer.clone(),
            partitions.clone(),
            object_store.clone(),
            fetcher_config.clone(),
            shutdown.clone(),
        )));
    }

    let flush_interval = config.batch_flush_interval;
    let flush_partitions = partitions.clone();
    let flush_object_store = object_store.clone();
    let flush_prefix = config.object_store_prefix.clone();
    let flush_compression = config.compression;
    let flush_shutdown = shutdown.clone();
    tasks.push(tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = flush_shutdown.cancelled() => break,
                _ = interval.tick() => {
                    for key in flush_partitions.due_for_flush(flush_interval) {
                        if let Some(state) = flush_partitions.take(&key) {
                            sealer::seal(&flush_object_store, &flush_prefix, flush_compression, &key, state).await;
                        }
                    }
                }
            }
        }
    }));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining");
    shutdown.cancel();

    let drain = async {
        for partition in partitions.all_keys() {
            if let Some(state) = partitions.take(&partition) {
                sealer::seal(
                    &object_store,
                    &config.object_store_prefix,
                    config.compression,
                    &partition,
                    state,
                )
                .await;
            }
        }
    };

    if tokio::time::timeout(config.shutdown_timeout, drain)
        .await
        .is_err()
    {
        tracing::warn!(
            remaining = partitions.len(),
            "shutdown timeout exceeded; unsealed partitions will redeliver on next start"
        );
    }

    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("causality-warehouse-sink stopped");
    Ok(())
}
