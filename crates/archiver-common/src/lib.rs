//! Archiver Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the archiver workspace.
//!
//! # Overview
//!
//! - **Message model**: the [`Message`] pulled from a subscription and the
//!   [`StoredMessage`] document written to the bucket
//! - **Key layout**: deterministic object keys for stored and dead-lettered messages
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use archiver_common::{message_key, Message, StoredMessage};
//! use chrono::Utc;
//!
//! fn archive(message: &Message) -> archiver_common::Result<(String, Vec<u8>)> {
//!     let data = std::str::from_utf8(&message.payload).unwrap_or_default();
//!     let stored = StoredMessage::new(message, data, Utc::now());
//!     Ok((message_key(&message.id), stored.to_json_bytes()?))
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ArchiverError, Result};
pub use types::{
    dead_letter_key, message_key, DeadLetterRecord, Message, StoredMessage, DEAD_LETTER_PREFIX,
    JSON_CONTENT_TYPE, MESSAGE_PREFIX,
};
