//! Fetcher tasks: pull messages from the broker, route each decoded
//! envelope into the shared partition map. N fetchers run in parallel,
//! each routing into the same partition map.

use crate::partition::PartitionMap;
use crate::sealer;
use causality_broker::PullConsumer;
use causality_contracts::Envelope;
use causality_objectstore::ObjectStore;
use causality_parquet::Compression;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct FetcherConfig {
    pub batch_size: usize,
    pub max_wait: std::time::Duration,
    pub max_events_per_partition: usize,
    pub object_store_prefix: String,
    pub compression: Compression,
}

pub async fn run_fetcher(
    id: usize,
    consumer: Arc<dyn PullConsumer>,
    partitions: Arc<PartitionMap>,
    object_store: Arc<dyn ObjectStore>,
    config: Arc<FetcherConfig>,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let batch = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = consumer.fetch(config.batch_size, config.max_wait) => result,
        };

        let messages = match batch {
            Ok(messages) => messages,
            Err(e) => {
                warn!(fetcher = id, error = %e, "broker fetch failed, backing off");
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                continue;
            }
        };

        if messages.is_empty() {
            continue;
        }

        debug!(fetcher = id, count = messages.len(), "fetched messages");

        for message in messages {
            let envelope: Envelope = match serde_json::from_slice(message.payload()) {
                Ok(envelope) => envelope,
                Err(e) => {
                    // Not a valid envelope at all: this can never decode
                    // successfully on redelivery either. Poison it.
                    warn!(fetcher = id, error = %e, "undecodable message, terming");
                    if let Err(term_err) = message.term().await {
                        warn!(error = %term_err, "failed to term undecodable message");
                    }
                    continue;
                }
            };

            let partition = envelope.partition();
            let over_limit = partitions.insert(
                partition.clone(),
                envelope,
                message,
                config.max_events_per_partition,
            );

            if over_limit {
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
        }
    }
}
