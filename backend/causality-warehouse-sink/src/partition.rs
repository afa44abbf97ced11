//! Per-partition accumulation state: a partition is `Active` (this
//! struct exists in the map) until it is sealed, at which point it is
//! removed — there is no separate `Sealing`/`Failed` variant in memory,
//! since sealing and failure handling both end with the entry either
//! gone (success) or put back for a later flush tick (failure).

use causality_broker::BrokerMessage;
use causality_contracts::{Envelope, Partition};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

pub struct TrackedPartition {
    pub envelopes: Vec<Envelope>,
    pub messages: Vec<Box<dyn BrokerMessage>>,
    pub first_insert: Instant,
}

impl TrackedPartition {
    fn new() -> Self {
        Self {
            envelopes: Vec::new(),
            messages: Vec::new(),
            first_insert: Instant::now(),
        }
    }
}

/// One write lock per map mutation. Accumulation under a plain
/// `Mutex<HashMap<..>>` is adequate at the fetcher-pool sizes this binary
/// runs with; a sharded map would only pay off with far higher fetcher
/// concurrency than this consumer's configured policy implies.
#[derive(Default)]
pub struct PartitionMap {
    inner: Mutex<HashMap<Partition, TrackedPartition>>,
}

impl PartitionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one envelope + its originating message handle. Returns
    /// `true` if this insert pushed the partition over `max_events`,
    /// signaling the caller should seal it immediately.
    pub fn insert(
        &self,
        partition: Partition,
        envelope: Envelope,
        message: Box<dyn BrokerMessage>,
        max_events: usize,
    ) -> bool {
        let mut guard = self.inner.lock();
        let entry = guard.entry(partition).or_insert_with(TrackedPartition::new);
        entry.envelopes.push(envelope);
        entry.messages.push(message);
        entry.envelopes.len() >= max_events
    }

    /// Remove and return a partition's accumulated state for sealing.
    pub fn take(&self, partition: &Partition) -> Option<TrackedPartition> {
        self.inner.lock().remove(partition)
    }

    /// Partitions whose first insert is older than `flush_interval`.
    pub fn due_for_flush(&self, flush_interval: std::time::Duration) -> Vec<Partition> {
        let guard = self.inner.lock();
        let now = Instant::now();
        guard
            .iter()
            .filter(|(_, state)| now.duration_since(state.first_insert) >= flush_interval)
            .map(|(partition, _)| partition.clone())
            .collect()
    }

    /// All partitions currently tracked — used to force-seal on shutdown.
    pub fn all_keys(&self) -> Vec<Partition> {
        self.inner.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
