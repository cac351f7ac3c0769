//! Host storage engine boundary.
//!
//! The feed never reaches into an engine. The engine calls these traits
//! instead: once per shard copy when it starts or closes, and once per
//! committed write on the shard's own indexing thread.

mod memory;

use std::fmt;

use bytes::Bytes;

pub use memory::{IndexInfo, MemoryEngine, MAX_REPLICAS, MAX_SHARDS};

use crate::event::Operation;

/// Identity and role of one shard copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardRouting {
    /// Index the shard belongs to.
    pub index: String,
    /// Shard number within the index.
    pub shard: u32,
    /// Replica slot; `0` is the primary copy.
    pub copy: u32,
    /// Incarnation of this copy. A copy recreated under the same index name,
    /// shard, and slot gets a new allocation id.
    pub allocation_id: u64,
}

impl ShardRouting {
    pub fn primary(index: impl Into<String>, shard: u32) -> Self {
        Self {
            index: index.into(),
            shard,
            copy: 0,
            allocation_id: 0,
        }
    }

    pub fn replica(index: impl Into<String>, shard: u32, copy: u32) -> Self {
        debug_assert!(copy > 0, "replica copies start at 1");
        Self {
            index: index.into(),
            shard,
            copy,
            allocation_id: 0,
        }
    }

    pub fn with_allocation_id(mut self, allocation_id: u64) -> Self {
        self.allocation_id = allocation_id;
        self
    }

    pub fn is_primary(&self) -> bool {
        self.copy == 0
    }
}

impl fmt::Display for ShardRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = if self.is_primary() { "p" } else { "r" };
        write!(f, "[{}][{}][{}{}]", self.index, self.shard, role, self.copy)
    }
}

/// A committed create or index write.
#[derive(Debug, Clone, PartialEq)]
pub struct DocWrite {
    pub id: String,
    pub doc_type: String,
    pub version: u64,
    pub source: Bytes,
}

/// A committed delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocDelete {
    pub id: String,
    pub doc_type: String,
    pub version: u64,
}

/// One committed write as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create(DocWrite),
    Index(DocWrite),
    Delete(DocDelete),
}

impl Mutation {
    pub fn operation(&self) -> Operation {
        match self {
            Mutation::Create(_) => Operation::Create,
            Mutation::Index(_) => Operation::Index,
            Mutation::Delete(_) => Operation::Delete,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Mutation::Create(w) | Mutation::Index(w) => &w.id,
            Mutation::Delete(d) => &d.id,
        }
    }
}

/// Per-shard hook invoked after every committed write.
///
/// Called on the engine's indexing thread, so implementations must not
/// block and must not panic.
pub trait IndexingListener: Send + Sync {
    fn on_mutation(&self, mutation: &Mutation);
}

/// Engine-wide hook invoked as shard copies come and go.
pub trait ShardLifecycleListener: Send + Sync {
    /// A shard copy is ready to accept writes. Returning a listener attaches
    /// it to that copy.
    fn after_shard_started(
        &self,
        routing: &ShardRouting,
    ) -> Option<std::sync::Arc<dyn IndexingListener>>;

    /// A shard copy was closed; it will fire no further notifications.
    fn after_shard_closed(&self, routing: &ShardRouting);
}
