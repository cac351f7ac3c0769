//! Shared application state.

use std::sync::Arc;

use shardfeed_core::{
    Broadcaster, MemoryEngine, SharedFeedMetrics, SharedSubscriberRegistry, SubscriberRegistry,
};

use crate::config::FeedConfig;
use crate::error::Error;

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    /// Host engine whose shards are tapped.
    pub engine: Arc<MemoryEngine>,
    pub broadcaster: Arc<Broadcaster>,
    pub config: FeedConfig,
}

impl AppState {
    /// Build the feed from configuration and hook it into a fresh engine.
    pub fn new(config: FeedConfig) -> Result<Self, Error> {
        Self::with_engine(config, Arc::new(MemoryEngine::new()))
    }

    /// Build the feed and hook it into an existing engine.
    ///
    /// Only shards started after this call are tapped.
    pub fn with_engine(config: FeedConfig, engine: Arc<MemoryEngine>) -> Result<Self, Error> {
        let sources = config.source_set()?;
        let registry = Arc::new(SubscriberRegistry::new());
        let broadcaster = Broadcaster::new(sources, registry, config.shard_policy());
        engine.add_lifecycle_listener(broadcaster.clone());

        Ok(Self {
            engine,
            broadcaster,
            config,
        })
    }

    pub fn registry(&self) -> &SharedSubscriberRegistry {
        self.broadcaster.registry()
    }

    pub fn metrics(&self) -> &SharedFeedMetrics {
        self.broadcaster.metrics()
    }
}
