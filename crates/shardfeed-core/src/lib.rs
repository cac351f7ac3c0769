//! shardfeed core - live change capture for sharded document stores.
//!
//! This crate hooks into a storage engine's per-shard write notifications,
//! filters each change against the configured `listenSource` rules, renders
//! it into a JSON envelope, and fans it out to every connected subscriber.
//! Delivery is best effort: nothing is persisted or replayed.

pub mod broadcaster;
pub mod engine;
pub mod error;
pub mod event;
pub mod matcher;
pub mod metrics;
pub mod registry;
pub mod serializer;
pub mod source;
pub mod tap;

pub use broadcaster::{Broadcaster, FeedState, PublishOutcome};
pub use engine::{
    DocDelete, DocWrite, IndexInfo, IndexingListener, MemoryEngine, Mutation,
    ShardLifecycleListener, ShardRouting,
};
pub use error::{DeliveryError, EngineError, Error, Result, SerializationError};
pub use event::{ChangeEvent, Operation};
pub use matcher::SourceMatcher;
pub use metrics::{FeedMetrics, MetricsSnapshot, SharedFeedMetrics};
pub use registry::{SendHandle, SharedSubscriberRegistry, Subscriber, SubscriberRegistry};
pub use serializer::{Envelope, EventSerializer};
pub use source::{ChangeSource, Selector, SourceSet};
pub use tap::{MutationTap, ShardPolicy};
