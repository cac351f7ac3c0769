//! Live subscriber connections.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::DeliveryError;
use crate::serializer::Envelope;

/// Capability to push one envelope to one connection.
///
/// Implementations must not block: the broadcaster calls `send` on the
/// storage engine's indexing thread.
pub trait SendHandle: Send + Sync {
    fn send(&self, envelope: &Envelope) -> Result<(), DeliveryError>;
}

/// A connected subscriber.
///
/// The registry only keeps the send handle; the transport owns the socket.
#[derive(Clone)]
pub struct Subscriber {
    connection_id: Arc<str>,
    handle: Arc<dyn SendHandle>,
}

impl Subscriber {
    pub fn new(connection_id: impl Into<Arc<str>>, handle: Arc<dyn SendHandle>) -> Self {
        Self {
            connection_id: connection_id.into(),
            handle,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn send(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        self.handle.send(envelope)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

/// Concurrent set of subscribers keyed by connection id.
pub struct SubscriberRegistry {
    subscribers: DashMap<Arc<str>, Subscriber>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Add a subscriber. An existing entry with the same id is replaced.
    pub fn register(&self, subscriber: Subscriber) {
        let id = subscriber.connection_id.clone();
        if self.subscribers.insert(id.clone(), subscriber).is_some() {
            tracing::debug!(connection_id = %id, "replaced existing subscriber");
        } else {
            tracing::debug!(connection_id = %id, "subscriber registered");
        }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    ///
    /// Returns whether an entry was removed.
    pub fn unregister(&self, connection_id: &str) -> bool {
        let removed = self.subscribers.remove(connection_id).is_some();
        if removed {
            tracing::debug!(connection_id, "subscriber unregistered");
        }
        removed
    }

    /// Copy of the current subscribers, safe to iterate while other threads
    /// register and unregister.
    pub fn snapshot(&self) -> Vec<Subscriber> {
        self.subscribers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.subscribers.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Ids of all registered connections.
    pub fn connection_ids(&self) -> Vec<String> {
        self.subscribers
            .iter()
            .map(|entry| entry.key().to_string())
            .collect()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared registry handle.
pub type SharedSubscriberRegistry = Arc<SubscriberRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<String>>,
    }

    impl SendHandle for Recorder {
        fn send(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
            self.messages.lock().push(envelope.to_string());
            Ok(())
        }
    }

    fn subscriber(id: &str) -> (Subscriber, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (Subscriber::new(id, recorder.clone()), recorder)
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = SubscriberRegistry::new();
        let (s1, _) = subscriber("c1");
        let (s2, _) = subscriber("c2");

        registry.register(s1);
        registry.register(s2);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("c1"));

        assert!(registry.unregister("c1"));
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains("c1"));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let (s1, _) = subscriber("c1");
        registry.register(s1);

        assert!(registry.unregister("c1"));
        assert!(!registry.unregister("c1"));
        assert!(!registry.unregister("never-registered"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_last_write_wins() {
        let registry = SubscriberRegistry::new();
        let (old, _) = subscriber("c1");
        let (new, new_recorder) = subscriber("c1");
        registry.register(old);
        registry.register(new);

        assert_eq!(registry.len(), 1);
        let snapshot = registry.snapshot();
        let envelope = crate::serializer::EventSerializer::serialize(
            "i",
            &crate::event::ChangeEvent::delete("1", "t", 1),
        )
        .unwrap();
        snapshot[0].send(&envelope).unwrap();
        assert_eq!(new_recorder.messages.lock().len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached_from_later_changes() {
        let registry = SubscriberRegistry::new();
        let (s1, _) = subscriber("c1");
        registry.register(s1);

        let snapshot = registry.snapshot();
        let (s2, _) = subscriber("c2");
        registry.register(s2);
        registry.unregister("c1");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].connection_id(), "c1");
    }

    #[test]
    fn test_concurrent_register_and_snapshot() {
        let registry = Arc::new(SubscriberRegistry::new());

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let id = format!("t{}-{}", t, i);
                        let (s, _) = subscriber(&id);
                        registry.register(s);
                        if i % 2 == 0 {
                            registry.unregister(&id);
                        }
                    }
                })
            })
            .collect();

        let reader = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let _ = registry.snapshot();
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        assert_eq!(registry.len(), 4 * 125);
    }
}
