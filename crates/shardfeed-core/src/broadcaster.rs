//! Fan-out of captured changes to subscribers.
//!
//! ```text
//! engine write ─► MutationTap ─► SourceMatcher ─► EventSerializer ─► registry snapshot ─► send × N
//! ```
//!
//! `publish` runs on whichever indexing thread committed the write, so it
//! touches only the read-only rule set, the concurrent registry, and atomic
//! counters. Every failure past the matcher is reduced to a log record.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::engine::{IndexingListener, ShardLifecycleListener, ShardRouting};
use crate::error::DeliveryError;
use crate::event::ChangeEvent;
use crate::matcher::SourceMatcher;
use crate::metrics::{FeedMetrics, SharedFeedMetrics};
use crate::registry::{SharedSubscriberRegistry, Subscriber};
use crate::serializer::{Envelope, EventSerializer};
use crate::source::SourceSet;
use crate::tap::{MutationTap, ShardPolicy};

/// Lifecycle of the feed. There is no stopped state; process exit ends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// No shard has been tapped yet.
    Created,
    /// At least one tap has been attached.
    Listening,
}

/// What one `publish` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// No rule matched; nothing was serialized.
    Filtered,
    /// The event could not be serialized and was dropped.
    Dropped,
    /// The envelope was offered to every subscriber in the snapshot.
    Broadcast { delivered: usize, failed: usize },
}

/// Index, shard, and slot of a copy. Incarnations of a copy share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    index: String,
    shard: u32,
    copy: u32,
}

impl From<&ShardRouting> for SlotKey {
    fn from(routing: &ShardRouting) -> Self {
        Self {
            index: routing.index.clone(),
            shard: routing.shard,
            copy: routing.copy,
        }
    }
}

/// The tap currently bound to a slot.
struct Binding {
    routing: ShardRouting,
    active: Arc<AtomicBool>,
}

/// Orchestrates capture, filtering, serialization, and delivery.
pub struct Broadcaster {
    this: Weak<Broadcaster>,
    sources: SourceSet,
    registry: SharedSubscriberRegistry,
    policy: ShardPolicy,
    metrics: SharedFeedMetrics,
    /// Active shard bindings; the flag is shared with the shard's tap.
    bindings: DashMap<SlotKey, Binding>,
    listening: AtomicBool,
}

impl Broadcaster {
    pub fn new(
        sources: SourceSet,
        registry: SharedSubscriberRegistry,
        policy: ShardPolicy,
    ) -> Arc<Self> {
        Self::with_metrics(sources, registry, policy, Arc::new(FeedMetrics::new()))
    }

    pub fn with_metrics(
        sources: SourceSet,
        registry: SharedSubscriberRegistry,
        policy: ShardPolicy,
        metrics: SharedFeedMetrics,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            sources,
            registry,
            policy,
            metrics,
            bindings: DashMap::new(),
            listening: AtomicBool::new(false),
        })
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn registry(&self) -> &SharedSubscriberRegistry {
        &self.registry
    }

    pub fn policy(&self) -> ShardPolicy {
        self.policy
    }

    pub fn metrics(&self) -> &SharedFeedMetrics {
        &self.metrics
    }

    pub fn state(&self) -> FeedState {
        if self.listening.load(Ordering::Acquire) {
            FeedState::Listening
        } else {
            FeedState::Created
        }
    }

    /// Bind a tap to a started shard copy.
    ///
    /// Returns `None` when the shard policy excludes the copy. Attaching a
    /// copy that is already bound replaces the old tap, which goes inert.
    pub fn attach(&self, routing: &ShardRouting) -> Option<Arc<MutationTap>> {
        if !self.policy.admits(routing) {
            tracing::debug!(shard = %routing, "shard policy excludes copy, no tap attached");
            return None;
        }

        let this = self.this.upgrade()?;
        let active = Arc::new(AtomicBool::new(true));
        let binding = Binding {
            routing: routing.clone(),
            active: active.clone(),
        };
        if let Some(previous) = self.bindings.insert(SlotKey::from(routing), binding) {
            previous.active.store(false, Ordering::Release);
        } else {
            self.metrics.record_attach();
        }
        self.listening.store(true, Ordering::Release);

        tracing::info!(shard = %routing, "change tap attached");
        Some(Arc::new(MutationTap::new(routing.clone(), this, active)))
    }

    /// Unbind the tap of a closed shard copy.
    ///
    /// Unknown copies are ignored, as is a late close for an older
    /// incarnation of a slot that has since been re-attached.
    pub fn detach(&self, routing: &ShardRouting) -> bool {
        let removed = self
            .bindings
            .remove_if(&SlotKey::from(routing), |_, binding| binding.routing == *routing);
        match removed {
            Some((_, binding)) => {
                binding.active.store(false, Ordering::Release);
                self.metrics.record_detach();
                tracing::info!(shard = %routing, "change tap detached");
                true
            }
            None => {
                tracing::debug!(shard = %routing, "no current tap for closed shard copy");
                false
            }
        }
    }

    /// Shard copies that currently have a tap.
    pub fn bound_shards(&self) -> Vec<ShardRouting> {
        self.bindings
            .iter()
            .map(|e| e.value().routing.clone())
            .collect()
    }

    /// Filter, serialize, and fan out one event observed on `index`.
    pub fn publish(&self, index: &str, event: &ChangeEvent) -> PublishOutcome {
        if !SourceMatcher::eligible(index, event, &self.sources) {
            self.metrics.record_filtered();
            tracing::trace!(index, doc_id = event.id(), "change filtered out");
            return PublishOutcome::Filtered;
        }
        self.metrics.record_matched();

        let envelope = match EventSerializer::serialize(index, event) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.metrics.record_serialization_failure();
                tracing::error!(
                    index,
                    doc_id = event.id(),
                    error = %e,
                    "failed to serialize change, dropping event"
                );
                return PublishOutcome::Dropped;
            }
        };

        let subscribers = self.registry.snapshot();
        let mut delivered = 0;
        let mut failed = 0;
        for subscriber in &subscribers {
            match deliver(subscriber, &envelope) {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.record_delivery();
                }
                Err(e) => {
                    failed += 1;
                    self.metrics.record_delivery_failure();
                    tracing::warn!(
                        connection_id = subscriber.connection_id(),
                        index,
                        doc_id = event.id(),
                        error = %e,
                        "failed to send change"
                    );
                }
            }
        }

        tracing::trace!(
            index,
            doc_id = event.id(),
            operation = %event.operation(),
            delivered,
            failed,
            "change broadcast"
        );
        PublishOutcome::Broadcast { delivered, failed }
    }
}

/// Send to one subscriber, turning a panicking handle into an error.
fn deliver(subscriber: &Subscriber, envelope: &Envelope) -> Result<(), DeliveryError> {
    panic::catch_unwind(AssertUnwindSafe(|| subscriber.send(envelope)))
        .unwrap_or(Err(DeliveryError::Panicked))
}

impl ShardLifecycleListener for Broadcaster {
    fn after_shard_started(&self, routing: &ShardRouting) -> Option<Arc<dyn IndexingListener>> {
        self.attach(routing)
            .map(|tap| tap as Arc<dyn IndexingListener>)
    }

    fn after_shard_closed(&self, routing: &ShardRouting) {
        self.detach(routing);
    }
}
