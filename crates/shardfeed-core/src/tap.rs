//! Per-shard capture hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::broadcaster::Broadcaster;
use crate::engine::{IndexingListener, Mutation, ShardRouting};
use crate::event::ChangeEvent;

/// Which shard copies get a tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardPolicy {
    /// Only primary copies; one event per logical write.
    #[default]
    PrimaryOnly,
    /// Every copy; a write is reported once per copy.
    AllShards,
}

impl ShardPolicy {
    pub fn from_primary_only(primary_only: bool) -> Self {
        if primary_only {
            ShardPolicy::PrimaryOnly
        } else {
            ShardPolicy::AllShards
        }
    }

    /// Whether a tap should be attached to this copy.
    pub fn admits(&self, routing: &ShardRouting) -> bool {
        match self {
            ShardPolicy::PrimaryOnly => routing.is_primary(),
            ShardPolicy::AllShards => true,
        }
    }
}

/// Capture hook bound to one shard copy.
///
/// Turns each committed write into a [`ChangeEvent`] and hands it to the
/// broadcaster on the calling (indexing) thread. Once detached the tap
/// ignores further notifications, even if the engine still holds it.
pub struct MutationTap {
    routing: ShardRouting,
    broadcaster: Arc<Broadcaster>,
    active: Arc<AtomicBool>,
}

impl MutationTap {
    pub(crate) fn new(
        routing: ShardRouting,
        broadcaster: Arc<Broadcaster>,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            routing,
            broadcaster,
            active,
        }
    }

    pub fn routing(&self) -> &ShardRouting {
        &self.routing
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl IndexingListener for MutationTap {
    fn on_mutation(&self, mutation: &Mutation) {
        if !self.is_active() {
            return;
        }

        let event = ChangeEvent::from_mutation(mutation);
        self.broadcaster.metrics().record_mutation(event.operation());
        self.broadcaster.publish(&self.routing.index, &event);
    }
}
