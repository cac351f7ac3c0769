//! Core error types.

use thiserror::Error;

/// Core change feed errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A `listenSource` rule string could not be parsed.
    #[error("invalid listen source '{source_str}': {reason}")]
    InvalidSource {
        /// The rule string as configured.
        source_str: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An event could not be rendered into an envelope.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// Host engine error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl Error {
    pub(crate) fn invalid_source(source_str: &str, reason: impl Into<String>) -> Self {
        Error::InvalidSource {
            source_str: source_str.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure to embed an event into the wire envelope.
///
/// Recoverable: the event is dropped and broadcasting continues.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The raw document body is not a well-formed JSON value.
    #[error("malformed payload for document '{id}': {source}")]
    MalformedPayload {
        /// Document id of the dropped event.
        id: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The envelope itself could not be written.
    #[error("failed to write envelope: {0}")]
    Envelope(#[source] serde_json::Error),
}

/// Failure to hand an envelope to one subscriber.
///
/// Isolated to that subscriber; it is never unregistered because of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The connection is gone.
    #[error("connection closed")]
    Closed,

    /// The subscriber's outbound queue is full.
    #[error("outbound queue full")]
    Backpressure,

    /// Transport-specific failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The send handle panicked.
    #[error("send handle panicked")]
    Panicked,
}

/// Errors raised by the in-memory host engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// An index with this name already exists.
    #[error("index already exists: {0}")]
    IndexExists(String),

    /// No index with this name.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// `create` was called for an id that is already stored.
    #[error("document already exists: {index}/{doc_type}/{id}")]
    DocumentExists {
        index: String,
        doc_type: String,
        id: String,
    },

    /// `delete` was called for an id that is not stored.
    #[error("document not found: {index}/{doc_type}/{id}")]
    DocumentNotFound {
        index: String,
        doc_type: String,
        id: String,
    },

    /// Shard count outside `1..=MAX_SHARDS`.
    #[error("invalid shard count: {0}")]
    InvalidShards(u32),

    /// Replica count above `MAX_REPLICAS`.
    #[error("invalid replica count: {0}")]
    InvalidReplicas(u32),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
