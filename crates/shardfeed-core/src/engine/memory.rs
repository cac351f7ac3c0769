//! In-memory sharded document store.
//!
//! A small host engine for running and testing the feed. Documents are
//! routed to a shard by id, each shard has one primary copy and any number
//! of replica copies, and every committed write is reported to the listeners
//! of each copy while the shard's write lock is held, which keeps per-shard
//! notification order equal to commit order.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::{
    DocDelete, DocWrite, IndexingListener, Mutation, ShardLifecycleListener, ShardRouting,
};
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DocKey {
    doc_type: String,
    id: String,
}

/// Latest revision of a document; `source` is `None` once deleted.
#[derive(Debug, Clone)]
struct StoredDoc {
    version: u64,
    source: Option<Bytes>,
}

struct ShardCopy {
    routing: ShardRouting,
    listeners: RwLock<Vec<Arc<dyn IndexingListener>>>,
}

impl ShardCopy {
    fn notify(&self, mutation: &Mutation) {
        for listener in self.listeners.read().iter() {
            listener.on_mutation(mutation);
        }
    }
}

struct Shard {
    docs: Mutex<HashMap<DocKey, StoredDoc>>,
    copies: Vec<ShardCopy>,
}

struct MemoryIndex {
    name: String,
    shards: Vec<Shard>,
    replicas: u32,
}

impl MemoryIndex {
    fn new(name: &str, shards: u32, replicas: u32, allocation_id: u64) -> Self {
        let shards = (0..shards)
            .map(|shard| Shard {
                docs: Mutex::new(HashMap::new()),
                copies: (0..=replicas)
                    .map(|copy| ShardCopy {
                        routing: ShardRouting {
                            index: name.to_string(),
                            shard,
                            copy,
                            allocation_id,
                        },
                        listeners: RwLock::new(Vec::new()),
                    })
                    .collect(),
            })
            .collect();

        Self {
            name: name.to_string(),
            shards,
            replicas,
        }
    }

    fn route(&self, id: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let slot = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[slot]
    }

    fn copies(&self) -> impl Iterator<Item = &ShardCopy> {
        self.shards.iter().flat_map(|shard| shard.copies.iter())
    }

    fn document_count(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .docs
                    .lock()
                    .values()
                    .filter(|doc| doc.source.is_some())
                    .count()
            })
            .sum()
    }
}

/// Summary of one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub shards: u32,
    pub replicas: u32,
    pub documents: usize,
}

/// Most primary shards an index may have.
pub const MAX_SHARDS: u32 = 1024;

/// Most replica copies per shard.
pub const MAX_REPLICAS: u32 = 16;

enum WriteKind {
    Create(Bytes),
    Index(Bytes),
    Delete,
}

/// Sharded in-memory document store that reports writes to listeners.
pub struct MemoryEngine {
    indices: DashMap<String, Arc<MemoryIndex>>,
    lifecycle: RwLock<Vec<Arc<dyn ShardLifecycleListener>>>,
    next_allocation: AtomicU64,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            indices: DashMap::new(),
            lifecycle: RwLock::new(Vec::new()),
            next_allocation: AtomicU64::new(1),
        }
    }

    /// Register a lifecycle listener for shards started from now on.
    pub fn add_lifecycle_listener(&self, listener: Arc<dyn ShardLifecycleListener>) {
        self.lifecycle.write().push(listener);
    }

    /// Create an index and start every copy of every shard.
    pub fn create_index(&self, name: &str, shards: u32, replicas: u32) -> Result<(), EngineError> {
        if shards == 0 || shards > MAX_SHARDS {
            return Err(EngineError::InvalidShards(shards));
        }
        if replicas > MAX_REPLICAS {
            return Err(EngineError::InvalidReplicas(replicas));
        }

        match self.indices.entry(name.to_string()) {
            Entry::Occupied(_) => Err(EngineError::IndexExists(name.to_string())),
            Entry::Vacant(vacant) => {
                let allocation_id = self.next_allocation.fetch_add(1, Ordering::Relaxed);
                let index = MemoryIndex::new(name, shards, replicas, allocation_id);
                let lifecycle = self.lifecycle.read().clone();

                for copy in index.copies() {
                    for hook in &lifecycle {
                        if let Some(listener) = hook.after_shard_started(&copy.routing) {
                            copy.listeners.write().push(listener);
                        }
                    }
                }

                tracing::info!(index = name, shards, replicas, "index created");
                vacant.insert(Arc::new(index));
                Ok(())
            }
        }
    }

    /// Drop an index, closing every shard copy.
    pub fn delete_index(&self, name: &str) -> Result<(), EngineError> {
        let (_, index) = self
            .indices
            .remove(name)
            .ok_or_else(|| EngineError::IndexNotFound(name.to_string()))?;

        let lifecycle = self.lifecycle.read().clone();
        for copy in index.copies() {
            copy.listeners.write().clear();
            for hook in &lifecycle {
                hook.after_shard_closed(&copy.routing);
            }
        }

        tracing::info!(index = name, "index deleted");
        Ok(())
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn index_info(&self, name: &str) -> Option<IndexInfo> {
        self.indices.get(name).map(|index| IndexInfo {
            name: index.name.clone(),
            shards: index.shards.len() as u32,
            replicas: index.replicas,
            documents: index.document_count(),
        })
    }

    /// Info for every index, sorted by name.
    pub fn indices(&self) -> Vec<IndexInfo> {
        let names: Vec<String> = self.indices.iter().map(|e| e.key().clone()).collect();
        let mut infos: Vec<IndexInfo> = names
            .iter()
            .filter_map(|name| self.index_info(name))
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Store a new document; fails if the id is live.
    ///
    /// Returns the committed version.
    pub fn create(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: impl Into<Bytes>,
    ) -> Result<u64, EngineError> {
        self.write(index, doc_type, id, WriteKind::Create(source.into()))
    }

    /// Store a document, replacing any previous revision.
    pub fn index(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: impl Into<Bytes>,
    ) -> Result<u64, EngineError> {
        self.write(index, doc_type, id, WriteKind::Index(source.into()))
    }

    /// Remove a live document.
    pub fn delete(&self, index: &str, doc_type: &str, id: &str) -> Result<u64, EngineError> {
        self.write(index, doc_type, id, WriteKind::Delete)
    }

    /// Current revision and body of a live document.
    pub fn get(&self, index: &str, doc_type: &str, id: &str) -> Option<(u64, Bytes)> {
        let handle = self.indices.get(index).map(|e| e.value().clone())?;
        let key = DocKey {
            doc_type: doc_type.to_string(),
            id: id.to_string(),
        };
        let docs = handle.route(id).docs.lock();
        let doc = docs.get(&key)?;
        doc.source.clone().map(|source| (doc.version, source))
    }

    fn write(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        kind: WriteKind,
    ) -> Result<u64, EngineError> {
        // Clone the handle so the map guard is not held across notification.
        let handle = self
            .indices
            .get(index)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::IndexNotFound(index.to_string()))?;

        let shard = handle.route(id);
        let key = DocKey {
            doc_type: doc_type.to_string(),
            id: id.to_string(),
        };

        let mut docs = shard.docs.lock();
        let previous = docs.get(&key);
        let live = previous.map(|doc| doc.source.is_some()).unwrap_or(false);
        let version = previous.map(|doc| doc.version).unwrap_or(0) + 1;

        let mutation = match kind {
            WriteKind::Create(_) if live => {
                return Err(EngineError::DocumentExists {
                    index: index.to_string(),
                    doc_type: doc_type.to_string(),
                    id: id.to_string(),
                });
            }
            WriteKind::Delete if !live => {
                return Err(EngineError::DocumentNotFound {
                    index: index.to_string(),
                    doc_type: doc_type.to_string(),
                    id: id.to_string(),
                });
            }
            WriteKind::Create(source) => Mutation::Create(DocWrite {
                id: id.to_string(),
                doc_type: doc_type.to_string(),
                version,
                source,
            }),
            WriteKind::Index(source) => Mutation::Index(DocWrite {
                id: id.to_string(),
                doc_type: doc_type.to_string(),
                version,
                source,
            }),
            WriteKind::Delete => Mutation::Delete(DocDelete {
                id: id.to_string(),
                doc_type: doc_type.to_string(),
                version,
            }),
        };

        let source = match &mutation {
            Mutation::Create(w) | Mutation::Index(w) => Some(w.source.clone()),
            Mutation::Delete(_) => None,
        };
        docs.insert(key, StoredDoc { version, source });

        for copy in &shard.copies {
            copy.notify(&mutation);
        }

        Ok(version)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(ShardRouting, Mutation)>>,
        closed: Mutex<Vec<ShardRouting>>,
    }

    struct CopyListener {
        routing: ShardRouting,
        recorder: Arc<Recorder>,
    }

    impl IndexingListener for CopyListener {
        fn on_mutation(&self, mutation: &Mutation) {
            self.recorder
                .seen
                .lock()
                .push((self.routing.clone(), mutation.clone()));
        }
    }

    impl ShardLifecycleListener for Arc<Recorder> {
        fn after_shard_started(&self, routing: &ShardRouting) -> Option<Arc<dyn IndexingListener>> {
            Some(Arc::new(CopyListener {
                routing: routing.clone(),
                recorder: self.clone(),
            }))
        }

        fn after_shard_closed(&self, routing: &ShardRouting) {
            self.closed.lock().push(routing.clone());
        }
    }

    fn engine_with_recorder() -> (MemoryEngine, Arc<Recorder>) {
        let engine = MemoryEngine::new();
        let recorder = Arc::new(Recorder::default());
        engine.add_lifecycle_listener(Arc::new(recorder.clone()));
        (engine, recorder)
    }

    #[test]
    fn test_versions_increment() {
        let (engine, _) = engine_with_recorder();
        engine.create_index("wallet", 2, 0).unwrap();

        assert_eq!(engine.create("wallet", "tx", "a", &b"{}"[..]).unwrap(), 1);
        assert_eq!(engine.index("wallet", "tx", "a", &b"{\"n\":1}"[..]).unwrap(), 2);
        assert_eq!(engine.delete("wallet", "tx", "a").unwrap(), 3);
        assert_eq!(engine.index("wallet", "tx", "a", &b"{}"[..]).unwrap(), 4);
        assert_eq!(engine.get("wallet", "tx", "a").unwrap().0, 4);
    }

    #[test]
    fn test_create_conflict_and_missing_delete() {
        let (engine, _) = engine_with_recorder();
        engine.create_index("wallet", 1, 0).unwrap();
        engine.create("wallet", "tx", "a", &b"{}"[..]).unwrap();

        assert!(matches!(
            engine.create("wallet", "tx", "a", &b"{}"[..]),
            Err(EngineError::DocumentExists { .. })
        ));
        assert!(matches!(
            engine.delete("wallet", "tx", "missing"),
            Err(EngineError::DocumentNotFound { .. })
        ));
        assert!(matches!(
            engine.index("nope", "tx", "a", &b"{}"[..]),
            Err(EngineError::IndexNotFound(_))
        ));
    }

    #[test]
    fn test_every_copy_is_notified() {
        let (engine, recorder) = engine_with_recorder();
        engine.create_index("wallet", 3, 2).unwrap();
        engine.index("wallet", "tx", "abc", &b"{}"[..]).unwrap();

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].0.is_primary());
        assert!(seen.iter().all(|(r, _)| r.shard == seen[0].0.shard));
        assert_eq!(seen.iter().filter(|(r, _)| r.is_primary()).count(), 1);
    }

    #[test]
    fn test_delete_index_closes_copies() {
        let (engine, recorder) = engine_with_recorder();
        engine.create_index("wallet", 2, 1).unwrap();
        engine.delete_index("wallet").unwrap();

        assert_eq!(recorder.closed.lock().len(), 4);
        assert!(!engine.has_index("wallet"));
        assert!(matches!(
            engine.delete_index("wallet"),
            Err(EngineError::IndexNotFound(_))
        ));
    }

    #[test]
    fn test_index_info() {
        let (engine, _) = engine_with_recorder();
        engine.create_index("b", 1, 0).unwrap();
        engine.create_index("a", 2, 1).unwrap();
        engine.index("a", "t", "1", &b"{}"[..]).unwrap();
        engine.index("a", "t", "2", &b"{}"[..]).unwrap();
        engine.delete("a", "t", "2").unwrap();

        let infos = engine.indices();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name, "a");
        assert_eq!(infos[0].documents, 1);
        assert_eq!(infos[0].replicas, 1);
        assert!(matches!(
            engine.create_index("a", 1, 0),
            Err(EngineError::IndexExists(_))
        ));
        assert!(matches!(
            engine.create_index("c", 0, 0),
            Err(EngineError::InvalidShards(0))
        ));
    }

    #[test]
    fn test_shard_and_replica_bounds() {
        let (engine, recorder) = engine_with_recorder();

        assert!(matches!(
            engine.create_index("x", u32::MAX, 0),
            Err(EngineError::InvalidShards(u32::MAX))
        ));
        assert!(matches!(
            engine.create_index("x", MAX_SHARDS + 1, 0),
            Err(EngineError::InvalidShards(_))
        ));
        assert!(matches!(
            engine.create_index("x", 1, u32::MAX),
            Err(EngineError::InvalidReplicas(u32::MAX))
        ));
        assert!(matches!(
            engine.create_index("x", 1, MAX_REPLICAS + 1),
            Err(EngineError::InvalidReplicas(_))
        ));
        assert!(!engine.has_index("x"));
        assert!(recorder.closed.lock().is_empty());

        engine.create_index("x", MAX_SHARDS, 0).unwrap();
        engine.create_index("y", 1, MAX_REPLICAS).unwrap();
        assert_eq!(engine.index_info("y").unwrap().replicas, MAX_REPLICAS);
    }

    #[test]
    fn test_recreated_index_gets_new_allocation() {
        let (engine, recorder) = engine_with_recorder();
        engine.create_index("wallet", 1, 0).unwrap();
        engine.index("wallet", "tx", "a", &b"{}"[..]).unwrap();
        engine.delete_index("wallet").unwrap();
        engine.create_index("wallet", 1, 0).unwrap();
        engine.index("wallet", "tx", "a", &b"{}"[..]).unwrap();

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0].0, seen[1].0);
        assert_eq!(seen[0].0.to_string(), seen[1].0.to_string());
        assert_eq!(recorder.closed.lock()[0], seen[0].0);
    }
}
