//! One compaction run: stateless, idempotent, driven entirely by
//! object-store listing. Never fails the scheduler tick — every error
//! is caught, logged, and skipped per-batch.

use crate::grouping::group_into_batches;
use crate::layout::{extract_partition, PartitionTuple};
use causality_objectstore::{ObjectStore, ObjectSummary};
use causality_parquet::{merge_parquet_files, Compression};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct CompactionStats {
    pub partitions_scanned: usize,
    pub batches_merged: usize,
    pub files_removed: usize,
}

pub async fn run_once(
    object_store: &Arc<dyn ObjectStore>,
    root_prefix: &str,
    target_size_bytes: u64,
    min_files: usize,
) -> CompactionStats {
    let mut stats = CompactionStats {
        partitions_scanned: 0,
        batches_merged: 0,
        files_removed: 0,
    };

    let objects = match object_store.list(root_prefix).await {
        Ok(objects) => objects,
        Err(e) => {
            error!(error = %e, "failed to list objects for compaction, skipping this tick");
            return stats;
        }
    };

    let mut by_partition: HashMap<PartitionTuple, Vec<ObjectSummary>> = HashMap::new();
    for object in objects {
        if let Some(partition) = extract_partition(&object.key) {
            by_partition.entry(partition).or_default().push(object);
        }
    }

    let now = chrono::Utc::now();
    stats.partitions_scanned = by_partition.len();

    for (partition, mut files) in by_partition {
        if !partition.is_cold(now) {
            continue;
        }

        files.retain(|f| f.size_bytes < target_size_bytes);
        files.sort_by(|a, b| a.key.cmp(&b.key));

        let batches = group_into_batches(files, target_size_bytes, min_files);

        for batch in batches {
            match compact_batch(object_store, root_prefix, &partition, &batch).await {
                Ok(()) => {
                    stats.batches_merged += 1;
                    stats.files_removed += batch.len();
                }
                Err(e) => {
                    warn!(app_id = %partition.app_id, error = %e, "batch compaction failed, leaving originals intact");
                }
            }
        }
    }

    stats
}

async fn compact_batch(
    object_store: &Arc<dyn ObjectStore>,
    root_prefix: &str,
    partition: &PartitionTuple,
    batch: &[ObjectSummary],
) -> anyhow::Result<()> {
    let mut files = Vec::with_capacity(batch.len());
    for summary in batch {
        files.push(object_store.get(&summary.key).await?);
    }

    let merged = merge_parquet_files(&files, Compression::Snappy)?;

    let new_key = format!(
        "{}/compacted_{}.parquet",
        partition.object_prefix(root_prefix),
        uuid::Uuid::new_v4()
    );
    object_store
        .put(&new_key, merged, "application/octet-stream")
        .await?;

    info!(key = %new_key, merged_from = batch.len(), "compaction batch merged and uploaded");

    // Upload succeeded; a failure past this point leaves the originals
    // as harmless duplicates until the next run's listing picks them up
    // again.
    for summary in batch {
        if let Err(e) = object_store.delete(&summary.key).await {
            warn!(key = %summary.key, error = %e, "failed to delete original after successful merge");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use causality_contracts::{Envelope, Payload};
    use causality_objectstore::memory::InMemoryObjectStore;
    use causality_parquet::encode_envelopes;

    fn sample_envelope(id: &str, timestamp_ms: i64) -> Envelope {
        Envelope {
            id: id.to_string(),
            app_id: "demo".to_string(),
            device_id: "device-1".to_string(),
            timestamp_ms,
            correlation_id: None,
            idempotency_key: None,
            device_context: None,
            payload: Payload::ScreenView {
                screen_name: "home".to_string(),
                previous_screen: None,
            },
        }
    }

    #[tokio::test]
    async fn compacts_small_cold_partition_files_and_preserves_row_count() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());

        // Two hours in the past is always strictly colder than the
        // current UTC hour, regardless of when this test runs.
        let past_ms = chrono::Utc::now().timestamp_millis() - 2 * 3_600_000;
        let partition = sample_envelope("e0", past_ms).partition();
        let prefix = partition.object_prefix("events");

        for i in 0..3 {
            let bytes =
                encode_envelopes(&[sample_envelope(&format!("e{i}"), past_ms)], Compression::Snappy)
                    .unwrap();
            store
                .put(&format!("{prefix}/{i}.parquet"), bytes, "application/octet-stream")
                .await
                .unwrap();
        }

        let stats = run_once(&store, "events", 10 * 1024 * 1024, 2).await;
        assert_eq!(stats.batches_merged, 1);
        assert_eq!(stats.files_removed, 3);

        let remaining = store.list(&prefix).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].key.contains("compacted_"));
    }
}
