//! Ingestion controller
//!
//! Pulls batches from the subscription and dispatches every message to the
//! processor on its own task. Two semaphores bound the work:
//!
//! - `flow`: one permit per message that was pulled and not yet disposed,
//!   `max_messages` in total. A pull asks for exactly as many messages as
//!   there are free permits.
//! - `workers`: `worker_count` permits bounding concurrent processing.
//!
//! Every message is acknowledged after a successful write and
//! negative-acknowledged otherwise, exactly once.

use archiver_common::Message;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::processor::{MessageProcessor, ProcessOutcome};
use super::stats::{PipelineStats, StatsSnapshot};
use crate::config::PipelineConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::source::{AckHandle, Delivery, SubscriptionSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    Idle,
    Pulling,
    Dispatching,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    pub max_messages: usize,
    pub worker_count: usize,
    pub empty_pull_backoff: Duration,
}

impl From<&PipelineConfig> for ControllerOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_messages: config.max_messages.max(1),
            worker_count: config.worker_count.max(1),
            empty_pull_backoff: config.empty_pull_backoff(),
        }
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

pub struct IngestionController {
    source: Arc<dyn SubscriptionSource>,
    processor: MessageProcessor,
    options: ControllerOptions,
    stats: Arc<PipelineStats>,
    state: watch::Sender<ControllerState>,
}

impl IngestionController {
    /// Limits of zero are raised to one.
    pub fn new(
        source: Arc<dyn SubscriptionSource>,
        processor: MessageProcessor,
        mut options: ControllerOptions,
    ) -> Self {
        options.max_messages = options.max_messages.max(1);
        options.worker_count = options.worker_count.max(1);

        let (state, _) = watch::channel(ControllerState::Idle);
        Self {
            source,
            processor,
            options,
            stats: Arc::new(PipelineStats::default()),
            state,
        }
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> ControllerState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run the pull loop until `ct` is cancelled or a pull fails.
    ///
    /// Either way no new pull is started, and every message already handed
    /// out is disposed before this returns. Cancellation returns `Ok`; a
    /// pull failure returns [`ServiceError::Pull`].
    pub async fn run(&self, ct: CancellationToken) -> ServiceResult<()> {
        let flow = Arc::new(Semaphore::new(self.options.max_messages));
        let workers = Arc::new(Semaphore::new(self.options.worker_count));
        let mut in_flight = JoinSet::new();

        info!(
            subscription = self.source.subscription(),
            max_messages = self.options.max_messages,
            worker_count = self.options.worker_count,
            "Listening for messages"
        );

        let result = loop {
            reap_finished(&mut in_flight);
            self.set_state(ControllerState::Idle);

            let first = tokio::select! {
                biased;
                _ = ct.cancelled() => break Ok(()),
                permit = flow.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let mut permits = vec![first];
            while let Ok(permit) = flow.clone().try_acquire_owned() {
                permits.push(permit);
            }
            let requested = permits.len();

            self.set_state(ControllerState::Pulling);

            let pulled = tokio::select! {
                biased;
                _ = ct.cancelled() => break Ok(()),
                pulled = self.source.pull(requested) => pulled,
            };

            let deliveries = match pulled {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    error!(
                        subscription = self.source.subscription(),
                        error = %e,
                        "Pull failed, shutting down the pull loop"
                    );
                    break Err(ServiceError::Pull(e));
                }
            };

            if deliveries.is_empty() {
                drop(permits);
                self.set_state(ControllerState::Idle);
                tokio::select! {
                    biased;
                    _ = ct.cancelled() => break Ok(()),
                    _ = tokio::time::sleep(self.options.empty_pull_backoff) => continue,
                }
            }

            debug!(requested, received = deliveries.len(), "Pulled batch");
            self.stats.record_pulled(deliveries.len());
            self.set_state(ControllerState::Dispatching);

            let mut deliveries = deliveries.into_iter();

            // Permits first: zip stops on the permits without consuming a delivery.
            for (permit, delivery) in permits.into_iter().zip(deliveries.by_ref()) {
                self.dispatch(&mut in_flight, &workers, permit, delivery);
            }

            for excess in deliveries {
                self.nack_excess(excess, requested).await;
            }
        };

        if !in_flight.is_empty() {
            info!(in_flight = in_flight.len(), "Waiting for in-flight messages");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Message task did not complete");
            }
        }

        self.set_state(ControllerState::Shutdown);

        let stats = self.stats.snapshot();
        info!(
            pulled = stats.pulled,
            acked = stats.acked,
            nacked = stats.nacked,
            dead_lettered = stats.dead_lettered,
            dropped = stats.dropped,
            disposition_failures = stats.disposition_failures,
            "Ingestion stopped"
        );

        result
    }

    fn dispatch(
        &self,
        in_flight: &mut JoinSet<()>,
        workers: &Arc<Semaphore>,
        flow_permit: OwnedSemaphorePermit,
        delivery: Delivery,
    ) {
        let Delivery { message, receipt } = delivery;
        let handle = AckHandle::new(self.source.clone(), message.id.clone(), receipt);
        let processor = self.processor.clone();
        let stats = self.stats.clone();
        let workers = workers.clone();

        in_flight.spawn(async move {
            // Held until the message is disposed.
            let _flow_permit = flow_permit;
            let _worker = workers.acquire_owned().await.ok();
            handle_message(&processor, &stats, message, handle).await;
        });
    }

    async fn nack_excess(&self, delivery: Delivery, requested: usize) {
        warn!(
            message_id = %delivery.message.id,
            requested,
            "Source returned more messages than requested, releasing"
        );

        let handle = AckHandle::new(self.source.clone(), delivery.message.id, delivery.receipt);
        match handle.nack().await {
            Ok(()) => self.stats.record_excess_nacked(),
            Err(e) => {
                self.stats.record_disposition_failure();
                warn!(error = %e, "Failed to release excess message");
            }
        }
    }

    fn set_state(&self, state: ControllerState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

async fn handle_message(
    processor: &MessageProcessor,
    stats: &PipelineStats,
    message: Message,
    handle: AckHandle,
) {
    match processor.process(&message).await {
        Ok(outcome) => {
            match &outcome {
                ProcessOutcome::Stored { .. } => stats.record_stored(),
                ProcessOutcome::DeadLettered { key } => {
                    stats.record_dead_lettered();
                    info!(message_id = %message.id, key = %key, "Message dead-lettered");
                }
                ProcessOutcome::Dropped => {
                    stats.record_dropped();
                    info!(message_id = %message.id, "Malformed message dropped");
                }
            }

            match handle.ack().await {
                Ok(()) => {
                    stats.record_acked();
                    debug!(message_id = %message.id, "Message acknowledged");
                }
                Err(e) => {
                    stats.record_disposition_failure();
                    warn!(
                        message_id = %message.id,
                        error = %e,
                        "Ack failed, message will be redelivered after its deadline"
                    );
                }
            }
        }
        Err(e) => {
            warn!(message_id = %message.id, error = %e, "Processing failed, nacking message");

            match handle.nack().await {
                Ok(()) => stats.record_nacked(),
                Err(e) => {
                    stats.record_disposition_failure();
                    warn!(
                        message_id = %message.id,
                        error = %e,
                        "Nack failed, message will be redelivered after its deadline"
                    );
                }
            }
        }
    }
}

fn reap_finished(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.try_join_next() {
        if let Err(e) = joined {
            error!(error = %e, "Message task did not complete");
        }
    }
}
