//! Change feed counters.
//!
//! All counters are relaxed atomics bumped from the capture path; reading
//! them never blocks a writer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::event::Operation;

/// Counters for the capture and broadcast pipeline.
pub struct FeedMetrics {
    started_at: Instant,

    // Capture
    mutations_observed: AtomicU64,
    creates: AtomicU64,
    indexes: AtomicU64,
    deletes: AtomicU64,

    // Filtering
    events_filtered: AtomicU64,
    events_matched: AtomicU64,
    serialization_failures: AtomicU64,

    // Fan-out
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,

    // Shard bindings
    taps_attached: AtomicU64,
    taps_detached: AtomicU64,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            mutations_observed: AtomicU64::new(0),
            creates: AtomicU64::new(0),
            indexes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            events_filtered: AtomicU64::new(0),
            events_matched: AtomicU64::new(0),
            serialization_failures: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            taps_attached: AtomicU64::new(0),
            taps_detached: AtomicU64::new(0),
        }
    }

    /// Record a mutation seen by a tap.
    pub fn record_mutation(&self, operation: Operation) {
        self.mutations_observed.fetch_add(1, Ordering::Relaxed);

        match operation {
            Operation::Create => {
                self.creates.fetch_add(1, Ordering::Relaxed);
            }
            Operation::Index => {
                self.indexes.fetch_add(1, Ordering::Relaxed);
            }
            Operation::Delete => {
                self.deletes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_filtered(&self) {
        self.events_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_matched(&self) {
        self.events_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_serialization_failure(&self) {
        self.serialization_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attach(&self) {
        self.taps_attached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detach(&self) {
        self.taps_detached.fetch_add(1, Ordering::Relaxed);
    }

    // Getters

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn mutations_observed(&self) -> u64 {
        self.mutations_observed.load(Ordering::Relaxed)
    }

    pub fn events_filtered(&self) -> u64 {
        self.events_filtered.load(Ordering::Relaxed)
    }

    pub fn events_matched(&self) -> u64 {
        self.events_matched.load(Ordering::Relaxed)
    }

    pub fn serialization_failures(&self) -> u64 {
        self.serialization_failures.load(Ordering::Relaxed)
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    /// Taps currently bound to a shard.
    pub fn active_taps(&self) -> u64 {
        self.taps_attached
            .load(Ordering::Relaxed)
            .saturating_sub(self.taps_detached.load(Ordering::Relaxed))
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            mutations: MutationCounts {
                total: self.mutations_observed(),
                create: self.creates.load(Ordering::Relaxed),
                index: self.indexes.load(Ordering::Relaxed),
                delete: self.deletes.load(Ordering::Relaxed),
            },
            events_filtered: self.events_filtered(),
            events_matched: self.events_matched(),
            serialization_failures: self.serialization_failures(),
            deliveries: self.deliveries(),
            delivery_failures: self.delivery_failures(),
            active_taps: self.active_taps(),
        }
    }
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics handle.
pub type SharedFeedMetrics = Arc<FeedMetrics>;

#[derive(Debug, Clone, Serialize)]
pub struct MutationCounts {
    pub total: u64,
    pub create: u64,
    pub index: u64,
    pub delete: u64,
}

/// Serializable view of [`FeedMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub mutations: MutationCounts,
    pub events_filtered: u64,
    pub events_matched: u64,
    pub serialization_failures: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
    pub active_taps: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_mutations() {
        let metrics = FeedMetrics::new();
        metrics.record_mutation(Operation::Create);
        metrics.record_mutation(Operation::Index);
        metrics.record_mutation(Operation::Index);
        metrics.record_mutation(Operation::Delete);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.mutations.total, 4);
        assert_eq!(snapshot.mutations.create, 1);
        assert_eq!(snapshot.mutations.index, 2);
        assert_eq!(snapshot.mutations.delete, 1);
    }

    #[test]
    fn test_active_taps() {
        let metrics = FeedMetrics::new();
        metrics.record_attach();
        metrics.record_attach();
        metrics.record_detach();
        assert_eq!(metrics.active_taps(), 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = FeedMetrics::new();
        metrics.record_delivery();
        metrics.record_delivery_failure();

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["deliveries"], 1);
        assert_eq!(json["delivery_failures"], 1);
        assert_eq!(json["mutations"]["total"], 0);
    }
}
