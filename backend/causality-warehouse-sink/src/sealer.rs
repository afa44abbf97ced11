//! Sealing: encode a partition's accumulated envelopes into Parquet,
//! upload, then ACK every tracked message only after the upload commits.
//! On any failure the partition's messages are NAK'd for redelivery and
//! the local state is dropped — the broker is the only durable record
//! of unsealed work.

use crate::partition::TrackedPartition;
use causality_contracts::Partition;
use causality_objectstore::ObjectStore;
use causality_parquet::{encode_envelopes, Compression};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct SealOutcome {
    pub sealed: bool,
    pub event_count: usize,
}

pub async fn seal(
    object_store: &Arc<dyn ObjectStore>,
    prefix: &str,
    compression: Compression,
    partition: &Partition,
    state: TrackedPartition,
) -> SealOutcome {
    let event_count = state.envelopes.len();

    let bytes = match encode_envelopes(&state.envelopes, compression) {
        Ok(bytes) => bytes,
        Err(e) => {
            // Encode failure is unrecoverable for this envelope set: no
            // amount of redelivery fixes a schema/encode bug. Term every
            // message so the broker stops retrying it.
            error!(
                app_id = %partition.app_id,
                error = %e,
                "parquet encode failed, terming partition messages as poison"
            );
            for message in &state.messages {
                if let Err(term_err) = message.term().await {
                    warn!(error = %term_err, "failed to term poisoned message");
                }
            }
            return SealOutcome {
                sealed: false,
                event_count,
            };
        }
    };

    let key = format!(
        "{}/{}.parquet",
        partition.object_prefix(prefix),
        uuid::Uuid::new_v4()
    );

    match object_store.put(&key, bytes, "application/octet-stream").await {
        Ok(()) => {
            for message in &state.messages {
                if let Err(e) = message.ack().await {
                    warn!(error = %e, key = %key, "ack failed after successful upload");
                }
            }
            info!(key = %key, events = event_count, "partition sealed");
            SealOutcome {
                sealed: true,
                event_count,
            }
        }
        Err(e) => {
            warn!(error = %e, app_id = %partition.app_id, "upload failed, nacking partition for redelivery");
            for message in &state.messages {
                if let Err(nak_err) = message.nak(Some(Duration::from_secs(5))).await {
                    warn!(error = %nak_err, "nak failed");
                }
            }
            SealOutcome {
                sealed: false,
                event_count,
            }
        }
    }
}
