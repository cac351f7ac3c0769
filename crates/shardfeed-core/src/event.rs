//! Captured document mutations.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::Mutation;

/// Kind of committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// A document was created; the id did not exist before.
    Create,
    /// A document was written, replacing any previous revision.
    Index,
    /// A document was removed.
    Delete,
}

impl Operation {
    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Index => "INDEX",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured mutation.
///
/// Built once per engine notification and dropped after the broadcast pass.
/// The payload is present for `Create` and `Index` and absent for `Delete`;
/// the constructors are the only way to build an event, so the two cannot
/// disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    id: String,
    doc_type: String,
    timestamp: DateTime<Utc>,
    operation: Operation,
    version: u64,
    payload: Option<Bytes>,
}

impl ChangeEvent {
    /// Event for a newly created document.
    pub fn create(
        id: impl Into<String>,
        doc_type: impl Into<String>,
        version: u64,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self::new(id, doc_type, Operation::Create, version, Some(payload.into()))
    }

    /// Event for an upserted document.
    pub fn index(
        id: impl Into<String>,
        doc_type: impl Into<String>,
        version: u64,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self::new(id, doc_type, Operation::Index, version, Some(payload.into()))
    }

    /// Event for a deleted document.
    pub fn delete(id: impl Into<String>, doc_type: impl Into<String>, version: u64) -> Self {
        Self::new(id, doc_type, Operation::Delete, version, None)
    }

    /// Event for a mutation committed by the host engine.
    pub fn from_mutation(mutation: &Mutation) -> Self {
        match mutation {
            Mutation::Create(write) => Self::create(
                write.id.clone(),
                write.doc_type.clone(),
                write.version,
                write.source.clone(),
            ),
            Mutation::Index(write) => Self::index(
                write.id.clone(),
                write.doc_type.clone(),
                write.version,
                write.source.clone(),
            ),
            Mutation::Delete(delete) => {
                Self::delete(delete.id.clone(), delete.doc_type.clone(), delete.version)
            }
        }
    }

    fn new(
        id: impl Into<String>,
        doc_type: impl Into<String>,
        operation: Operation,
        version: u64,
        payload: Option<Bytes>,
    ) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            timestamp: Utc::now(),
            operation,
            version,
            payload,
        }
    }

    /// Override the capture time.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Raw document body, `None` for deletes.
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DocDelete, DocWrite};

    #[test]
    fn test_payload_presence_follows_operation() {
        let created = ChangeEvent::create("1", "tx", 1, &b"{}"[..]);
        let indexed = ChangeEvent::index("1", "tx", 2, &b"{\"a\":1}"[..]);
        let deleted = ChangeEvent::delete("1", "tx", 3);

        assert!(created.payload().is_some());
        assert!(indexed.payload().is_some());
        assert!(deleted.payload().is_none());
        assert_eq!(deleted.operation(), Operation::Delete);
    }

    #[test]
    fn test_from_mutation() {
        let write = DocWrite {
            id: "abc".to_string(),
            doc_type: "tx".to_string(),
            version: 3,
            source: Bytes::from_static(b"{\"amount\":10}"),
        };
        let event = ChangeEvent::from_mutation(&Mutation::Index(write));
        assert_eq!(event.id(), "abc");
        assert_eq!(event.doc_type(), "tx");
        assert_eq!(event.version(), 3);
        assert_eq!(event.operation(), Operation::Index);
        assert_eq!(event.payload().unwrap().as_ref(), b"{\"amount\":10}");

        let delete = DocDelete {
            id: "abc".to_string(),
            doc_type: "tx".to_string(),
            version: 4,
        };
        let event = ChangeEvent::from_mutation(&Mutation::Delete(delete));
        assert_eq!(event.operation(), Operation::Delete);
        assert!(event.payload().is_none());
    }

    #[test]
    fn test_operation_wire_names() {
        assert_eq!(Operation::Create.to_string(), "CREATE");
        assert_eq!(Operation::Index.to_string(), "INDEX");
        assert_eq!(
            serde_json::to_string(&Operation::Delete).unwrap(),
            "\"DELETE\""
        );
    }
}
