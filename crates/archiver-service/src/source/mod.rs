//! Subscription sources
//!
//! A source hands out batches of [`Delivery`] values and accepts exactly one
//! disposition per delivery. The controller never calls the disposition
//! methods directly; it wraps each delivery's receipt in an [`AckHandle`],
//! whose `ack`/`nack` consume the handle.

use archiver_common::Message;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::error::SourceError;

pub mod memory;
pub mod sqs;

pub use memory::MemorySubscription;
pub use sqs::{SqsSubscription, SubscriptionConfig};

/// A message together with the receipt used to dispose of it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub receipt: String,
}

/// Pull-based message queue
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// Name of the subscription this source reads from
    fn subscription(&self) -> &str;

    /// Pull up to `max_messages` messages. May return fewer, including none.
    async fn pull(&self, max_messages: usize) -> Result<Vec<Delivery>, SourceError>;

    /// Confirm processing; the message will not be delivered again.
    async fn acknowledge(&self, receipt: &str) -> Result<(), SourceError>;

    /// Release the message for redelivery.
    async fn negative_acknowledge(&self, receipt: &str) -> Result<(), SourceError>;

    /// Fetch subscription metadata without pulling data.
    async fn check_subscription(&self) -> Result<(), SourceError>;
}

/// Single-use disposition handle for one pulled message
pub struct AckHandle {
    source: Arc<dyn SubscriptionSource>,
    message_id: String,
    receipt: String,
    disposed: bool,
}

impl AckHandle {
    pub fn new(
        source: Arc<dyn SubscriptionSource>,
        message_id: impl Into<String>,
        receipt: impl Into<String>,
    ) -> Self {
        Self {
            source,
            message_id: message_id.into(),
            receipt: receipt.into(),
            disposed: false,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub async fn ack(mut self) -> Result<(), SourceError> {
        self.disposed = true;
        self.source.acknowledge(&self.receipt).await
    }

    pub async fn nack(mut self) -> Result<(), SourceError> {
        self.disposed = true;
        self.source.negative_acknowledge(&self.receipt).await
    }
}

impl Drop for AckHandle {
    fn drop(&mut self) {
        if !self.disposed {
            warn!(
                message_id = %self.message_id,
                subscription = self.source.subscription(),
                "Message released without disposition, left to ack-deadline redelivery"
            );
        }
    }
}

impl std::fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandle")
            .field("message_id", &self.message_id)
            .field("disposed", &self.disposed)
            .finish()
    }
}
