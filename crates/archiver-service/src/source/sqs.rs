//! Amazon SQS subscription
//!
//! The subscription name is the queue name and the project id is the account
//! that owns the queue. The ack deadline maps onto the visibility timeout:
//! an ack deletes the message, a nack makes it visible again immediately.

use archiver_common::Message;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::{
    config::Region,
    error::DisplayErrorContext,
    types::{MessageSystemAttributeName, QueueAttributeName},
    Client,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::{Delivery, SubscriptionSource};
use crate::error::SourceError;

/// SQS never returns more than ten messages per receive call.
pub const SQS_MAX_BATCH: usize = 10;

/// SQS rejects long-poll waits above twenty seconds.
pub const SQS_MAX_WAIT_SECS: u32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionConfig {
    pub project_id: String,
    pub name: String,
    pub ack_deadline_secs: u32,
    pub pull_wait_secs: u32,
    pub endpoint: Option<String>,
    pub region: String,
}

pub struct SqsSubscription {
    client: Client,
    config: SubscriptionConfig,
    queue_url: OnceCell<String>,
}

impl SqsSubscription {
    pub async fn new(config: SubscriptionConfig) -> Self {
        debug!("Initializing SQS subscription with config: {:?}", config);

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let client = Client::new(&loader.load().await);

        info!(
            subscription = %config.name,
            project = %config.project_id,
            "SQS subscription client initialized"
        );

        Self {
            client,
            config,
            queue_url: OnceCell::new(),
        }
    }

    /// Resolve the queue URL once and reuse it for every later call.
    async fn queue_url(&self) -> Result<&str, SourceError> {
        let url = self
            .queue_url
            .get_or_try_init(|| async {
                let output = self
                    .client
                    .get_queue_url()
                    .queue_name(&self.config.name)
                    .queue_owner_aws_account_id(&self.config.project_id)
                    .send()
                    .await
                    .map_err(|e| {
                        let not_found = e
                            .as_service_error()
                            .map(|se| se.is_queue_does_not_exist())
                            .unwrap_or(false);
                        if not_found {
                            SourceError::NotFound(self.config.name.clone())
                        } else {
                            SourceError::request("get_queue_url", DisplayErrorContext(&e).to_string())
                        }
                    })?;

                output
                    .queue_url()
                    .map(str::to_string)
                    .ok_or_else(|| SourceError::NotFound(self.config.name.clone()))
            })
            .await?;

        Ok(url.as_str())
    }

    fn to_delivery(&self, raw: &aws_sdk_sqs::types::Message) -> Option<Delivery> {
        let (Some(id), Some(receipt)) = (raw.message_id(), raw.receipt_handle()) else {
            warn!(
                subscription = %self.config.name,
                "Skipping SQS message without id or receipt handle"
            );
            return None;
        };

        let publish_time = raw
            .attributes()
            .and_then(|attrs| attrs.get(&MessageSystemAttributeName::SentTimestamp))
            .and_then(|millis| millis.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        let attributes: BTreeMap<String, String> = raw
            .message_attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .filter_map(|(k, v)| v.string_value().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Some(Delivery {
            message: Message {
                id: id.to_string(),
                payload: raw.body().unwrap_or_default().as_bytes().to_vec(),
                attributes,
                publish_time,
            },
            receipt: receipt.to_string(),
        })
    }
}

#[async_trait]
impl SubscriptionSource for SqsSubscription {
    fn subscription(&self) -> &str {
        &self.config.name
    }

    #[instrument(skip(self), fields(subscription = %self.config.name))]
    async fn pull(&self, max_messages: usize) -> Result<Vec<Delivery>, SourceError> {
        let visibility = i32::try_from(self.config.ack_deadline_secs).map_err(|_| {
            SourceError::request(
                "receive_message",
                format!("ack deadline of {}s is out of range", self.config.ack_deadline_secs),
            )
        })?;
        let wait = i32::try_from(self.config.pull_wait_secs.min(SQS_MAX_WAIT_SECS)).unwrap_or(0);
        let batch = i32::try_from(max_messages.clamp(1, SQS_MAX_BATCH)).unwrap_or(1);

        let queue_url = self.queue_url().await?;

        let output = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(batch)
            .wait_time_seconds(wait)
            .visibility_timeout(visibility)
            .message_system_attribute_names(MessageSystemAttributeName::SentTimestamp)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| SourceError::request("receive_message", DisplayErrorContext(&e).to_string()))?;

        let deliveries: Vec<Delivery> = output
            .messages()
            .iter()
            .filter_map(|raw| self.to_delivery(raw))
            .collect();

        debug!(count = deliveries.len(), "Received messages from SQS");

        Ok(deliveries)
    }

    #[instrument(skip(self, receipt), fields(subscription = %self.config.name))]
    async fn acknowledge(&self, receipt: &str) -> Result<(), SourceError> {
        let queue_url = self.queue_url().await?;

        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| SourceError::request("delete_message", DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    #[instrument(skip(self, receipt), fields(subscription = %self.config.name))]
    async fn negative_acknowledge(&self, receipt: &str) -> Result<(), SourceError> {
        let queue_url = self.queue_url().await?;

        self.client
            .change_message_visibility()
            .queue_url(queue_url)
            .receipt_handle(receipt)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| {
                SourceError::request("change_message_visibility", DisplayErrorContext(&e).to_string())
            })?;

        Ok(())
    }

    #[instrument(skip(self), fields(subscription = %self.config.name))]
    async fn check_subscription(&self) -> Result<(), SourceError> {
        let queue_url = self.queue_url().await?;

        let output = self
            .client
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::VisibilityTimeout)
            .send()
            .await
            .map_err(|e| {
                SourceError::request("get_queue_attributes", DisplayErrorContext(&e).to_string())
            })?;

        let visibility = output
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::VisibilityTimeout))
            .cloned()
            .unwrap_or_default();

        debug!(
            queue_url = %queue_url,
            visibility_timeout = %visibility,
            "Subscription metadata fetched"
        );

        Ok(())
    }
}
