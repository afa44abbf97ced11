mod compactor;
mod config;
mod grouping;
mod layout;

use causality_objectstore::{ObjectStore, S3ObjectStore};
use config::CompactionConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,causality_compaction=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting causality-compaction");

    let config = CompactionConfig::from_env();

    let endpoint_override = if config.object_store_endpoint.is_empty() {
        None
    } else {
        Some(config.object_store_endpoint.clone())
    };
    let object_store: Arc<dyn ObjectStore> = Arc::new(
        S3ObjectStore::connect(config.object_store_bucket.clone(), endpoint_override).await,
    );

    let shutdown = CancellationToken::new();
    let shutdown_on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_on_signal.cancel();
        }
    });

    // One run at a time, bounded by the scheduler interval.
    let mut interval = tokio::time::interval(config.interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let stats = compactor::run_once(
                    &object_store,
                    &config.object_store_prefix,
                    config.target_size_bytes,
                    config.min_files,
                )
                .await;
                tracing::info!(
                    partitions_scanned = stats.partitions_scanned,
                    batches_merged = stats.batches_merged,
                    files_removed = stats.files_removed,
                    "compaction tick complete"
                );
            }
        }
    }

    tracing::info!("causality-compaction stopped");
    Ok(())
}
