//! Archiver Service Library
//!
//! Pulls messages from a subscription and archives each one as a JSON
//! object in a blob store.
//!
//! # Overview
//!
//! - **Subscription source**: pull-based queue ([`source::SqsSubscription`],
//!   or [`source::MemorySubscription`] in process)
//! - **Storage sink**: S3-compatible bucket ([`storage::S3Storage`], or
//!   [`storage::MemoryStorage`] in process)
//! - **Pipeline**: bounded, concurrent processing with exactly one ack or
//!   nack per pulled message
//! - **Health**: startup connectivity gate plus an optional liveness probe
//!
//! # Delivery
//!
//! Delivery to storage is at-least-once. A message is acknowledged only after
//! its object is written; a redelivered message overwrites the same key
//! (`messages/{message_id}.json`).
//!
//! # Example
//!
//! ```no_run
//! use archiver_service::{config::Config, service::Archiver};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let archiver = Archiver::from_config(config).await;
//!     archiver.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod pipeline;
pub mod service;
pub mod source;
pub mod storage;

pub use config::Config;
pub use error::{ProcessingError, ServiceError, ServiceResult, SourceError, StorageError};
pub use health::{ComponentStatus, HealthMonitor, HealthReport};
pub use pipeline::{IngestionController, MalformedPolicy, MessageProcessor};
pub use service::Archiver;
