//! Message processor
//!
//! Turns one pulled message into one stored object. The processor never
//! retries and never acknowledges; the controller decides the disposition
//! from the returned result.

use archiver_common::{
    dead_letter_key, message_key, DeadLetterRecord, Message, StoredMessage, JSON_CONTENT_TYPE,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ProcessingError;
use crate::storage::StorageSink;

/// What to do with a message whose payload is not valid UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedPolicy {
    /// Negative-acknowledge, so the message is redelivered.
    Nack,
    /// Acknowledge without writing anything.
    Drop,
    /// Write the raw payload under `dead-letter/`, then acknowledge.
    #[default]
    DeadLetter,
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nack" => Ok(MalformedPolicy::Nack),
            "drop" => Ok(MalformedPolicy::Drop),
            "dead-letter" | "dead_letter" | "deadletter" => Ok(MalformedPolicy::DeadLetter),
            _ => Err(format!(
                "unknown malformed policy '{}', expected nack, drop or dead-letter",
                s
            )),
        }
    }
}

impl fmt::Display for MalformedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MalformedPolicy::Nack => "nack",
            MalformedPolicy::Drop => "drop",
            MalformedPolicy::DeadLetter => "dead-letter",
        };
        f.write_str(name)
    }
}

/// Successful processing result. Every variant is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Stored { key: String },
    DeadLettered { key: String },
    Dropped,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct MessageProcessor {
    sink: Arc<dyn StorageSink>,
    malformed_policy: MalformedPolicy,
    clock: Clock,
}

impl MessageProcessor {
    pub fn new(sink: Arc<dyn StorageSink>, malformed_policy: MalformedPolicy) -> Self {
        Self {
            sink,
            malformed_policy,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the source of `processed_at` timestamps.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn malformed_policy(&self) -> MalformedPolicy {
        self.malformed_policy
    }

    /// Store `message` as `messages/{id}.json`.
    ///
    /// Performs at most one write. A failed write is returned as
    /// [`ProcessingError::StorageFailure`] and leaves no object behind.
    pub async fn process(&self, message: &Message) -> Result<ProcessOutcome, ProcessingError> {
        let data = match std::str::from_utf8(&message.payload) {
            Ok(data) => data,
            Err(source) => return self.handle_malformed(message, source).await,
        };

        let stored = StoredMessage::new(message, data, (self.clock)());
        let body = stored
            .to_json_bytes()
            .map_err(|source| ProcessingError::Serialization {
                message_id: message.id.clone(),
                source,
            })?;

        let key = message_key(&message.id);
        self.write(&key, body).await?;

        debug!(message_id = %message.id, key = %key, "Message stored");

        Ok(ProcessOutcome::Stored { key })
    }

    async fn handle_malformed(
        &self,
        message: &Message,
        source: std::str::Utf8Error,
    ) -> Result<ProcessOutcome, ProcessingError> {
        warn!(
            message_id = %message.id,
            policy = %self.malformed_policy,
            error = %source,
            "Message payload is not valid UTF-8"
        );

        match self.malformed_policy {
            MalformedPolicy::Nack => Err(ProcessingError::Malformed {
                message_id: message.id.clone(),
                source,
            }),
            MalformedPolicy::Drop => Ok(ProcessOutcome::Dropped),
            MalformedPolicy::DeadLetter => {
                let record = DeadLetterRecord::new(message, source.to_string(), (self.clock)());
                let body = record
                    .to_json_bytes()
                    .map_err(|source| ProcessingError::Serialization {
                        message_id: message.id.clone(),
                        source,
                    })?;

                let key = dead_letter_key(&message.id);
                self.write(&key, body).await?;

                Ok(ProcessOutcome::DeadLettered { key })
            }
        }
    }

    async fn write(&self, key: &str, body: Vec<u8>) -> Result<(), ProcessingError> {
        self.sink
            .put(key, body, JSON_CONTENT_TYPE)
            .await
            .map_err(|source| ProcessingError::StorageFailure {
                key: key.to_string(),
                source,
            })
    }
}

impl fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageProcessor")
            .field("bucket", &self.sink.bucket())
            .field("malformed_policy", &self.malformed_policy)
            .finish()
    }
}
