//! Wire envelope rendering.
//!
//! Every delivered change is one JSON object with the fields below, always
//! in this order:
//!
//! ```text
//! {"_index":..,"_type":..,"_id":..,"_timestamp":..,"_version":..,"_operation":..,"_source":..}
//! ```
//!
//! `_source` is the stored document embedded verbatim and is left out for
//! deletes.

use std::fmt;
use std::sync::Arc;

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::value::RawValue;

use crate::error::SerializationError;
use crate::event::{ChangeEvent, Operation};

/// A rendered change message, shared by every subscriber of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    body: Arc<str>,
}

impl Envelope {
    pub fn as_str(&self) -> &str {
        &self.body
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.body.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body)
    }
}

impl From<Envelope> for String {
    fn from(envelope: Envelope) -> Self {
        envelope.body.to_string()
    }
}

#[derive(Serialize)]
struct Fields<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type")]
    doc_type: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(rename = "_timestamp")]
    timestamp: String,
    #[serde(rename = "_version")]
    version: u64,
    #[serde(rename = "_operation")]
    operation: Operation,
    #[serde(rename = "_source", skip_serializing_if = "Option::is_none")]
    source: Option<&'a RawValue>,
}

/// Renders change events into envelopes.
pub struct EventSerializer;

impl EventSerializer {
    /// Render `event`, observed on `index`, into an envelope.
    ///
    /// Fails only when the payload is not a JSON value.
    pub fn serialize(index: &str, event: &ChangeEvent) -> Result<Envelope, SerializationError> {
        let source = match event.payload() {
            Some(payload) => Some(serde_json::from_slice::<&RawValue>(payload).map_err(
                |source| SerializationError::MalformedPayload {
                    id: event.id().to_string(),
                    source,
                },
            )?),
            None => None,
        };

        let fields = Fields {
            index,
            doc_type: event.doc_type(),
            id: event.id(),
            timestamp: event
                .timestamp()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            version: event.version(),
            operation: event.operation(),
            source,
        };

        let body = serde_json::to_string(&fields).map_err(SerializationError::Envelope)?;
        Ok(Envelope { body: body.into() })
    }
}
