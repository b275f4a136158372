//! Message model and storage layout

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;

/// Prefix under which archived messages are written.
pub const MESSAGE_PREFIX: &str = "messages";

/// Prefix under which undecodable messages are written.
pub const DEAD_LETTER_PREFIX: &str = "dead-letter";

/// Content type of every object the archiver writes.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A message pulled from a subscription.
///
/// The payload is kept as raw bytes; decoding happens in the processor so a
/// payload that is not UTF-8 can still be handed to the dead-letter path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub payload: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
    pub publish_time: DateTime<Utc>,
}

impl Message {
    pub fn new(id: impl Into<String>, payload: impl Into<Vec<u8>>, publish_time: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            attributes: BTreeMap::new(),
            publish_time,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// JSON document written to `messages/{message_id}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: String,
    pub data: String,
    pub attributes: BTreeMap<String, String>,
    pub publish_time: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(message: &Message, data: &str, processed_at: DateTime<Utc>) -> Self {
        Self {
            message_id: message.id.clone(),
            data: data.to_string(),
            attributes: message.attributes.clone(),
            publish_time: message.publish_time,
            processed_at,
        }
    }

    /// Pretty-printed JSON body, two-space indented.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// JSON document written to `dead-letter/{message_id}.json` for payloads that
/// could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub message_id: String,
    pub data_base64: String,
    pub attributes: BTreeMap<String, String>,
    pub publish_time: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterRecord {
    pub fn new(message: &Message, reason: impl Into<String>, processed_at: DateTime<Utc>) -> Self {
        Self {
            message_id: message.id.clone(),
            data_base64: STANDARD.encode(&message.payload),
            attributes: message.attributes.clone(),
            publish_time: message.publish_time,
            processed_at,
            reason: reason.into(),
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Raw payload recovered from `data_base64`.
    pub fn payload(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.data_base64)
            .map_err(|e| crate::ArchiverError::InvalidValue {
                kind: "base64 payload",
                value: e.to_string(),
            })
    }
}

/// Object key for an archived message. Redelivery of the same id maps onto
/// the same key, so a second write replaces the first.
pub fn message_key(message_id: &str) -> String {
    format!("{}/{}.json", MESSAGE_PREFIX, message_id)
}

/// Object key for a dead-lettered message.
pub fn dead_letter_key(message_id: &str) -> String {
    format!("{}/{}.json", DEAD_LETTER_PREFIX, message_id)
}
