//! In-process subscription
//!
//! Holds published messages in a queue and tracks every disposition, so the
//! pipeline can run without a broker in tests and local runs.

use archiver_common::Message;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{Delivery, SubscriptionSource};
use crate::error::SourceError;

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    outstanding: HashMap<String, Message>,
    acked: Vec<String>,
    nacked: Vec<String>,
    pull_calls: usize,
    max_outstanding: usize,
    pull_error: Option<SourceError>,
    disposition_error: Option<SourceError>,
}

#[derive(Debug)]
pub struct MemorySubscription {
    name: String,
    exists: bool,
    redeliver_on_nack: bool,
    ignore_pull_limit: bool,
    state: Mutex<QueueState>,
}

impl MemorySubscription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: true,
            redeliver_on_nack: false,
            ignore_pull_limit: false,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// A subscription whose metadata lookup reports it as absent.
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            exists: false,
            ..Self::new(name)
        }
    }

    /// Put nacked messages back at the end of the queue.
    pub fn with_redelivery(mut self) -> Self {
        self.redeliver_on_nack = true;
        self
    }

    /// Return every ready message from `pull`, regardless of the requested count.
    pub fn ignoring_pull_limit(mut self) -> Self {
        self.ignore_pull_limit = true;
        self
    }

    pub fn publish(&self, message: Message) {
        self.lock().ready.push_back(message);
    }

    /// Make every following pull fail with `error`.
    pub fn fail_pulls(&self, error: SourceError) {
        self.lock().pull_error = Some(error);
    }

    /// Make every following ack/nack fail with `error`.
    pub fn fail_dispositions(&self, error: SourceError) {
        self.lock().disposition_error = Some(error);
    }

    pub fn acked(&self) -> Vec<String> {
        self.lock().acked.clone()
    }

    pub fn nacked(&self) -> Vec<String> {
        self.lock().nacked.clone()
    }

    pub fn pending(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding.len()
    }

    /// Highest number of messages that were pulled and not yet disposed.
    pub fn max_outstanding(&self) -> usize {
        self.lock().max_outstanding
    }

    pub fn pull_calls(&self) -> usize {
        self.lock().pull_calls
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A poisoned lock only means a test thread panicked while holding it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_outstanding(
        &self,
        state: &mut QueueState,
        receipt: &str,
        operation: &'static str,
    ) -> Result<Message, SourceError> {
        if let Some(error) = state.disposition_error.clone() {
            return Err(error);
        }

        state
            .outstanding
            .remove(receipt)
            .ok_or_else(|| SourceError::request(operation, format!("unknown receipt {}", receipt)))
    }
}

#[async_trait]
impl SubscriptionSource for MemorySubscription {
    fn subscription(&self) -> &str {
        &self.name
    }

    async fn pull(&self, max_messages: usize) -> Result<Vec<Delivery>, SourceError> {
        let mut state = self.lock();
        state.pull_calls += 1;

        if let Some(error) = state.pull_error.clone() {
            return Err(error);
        }

        let count = if self.ignore_pull_limit {
            state.ready.len()
        } else {
            max_messages.min(state.ready.len())
        };

        let mut deliveries = Vec::with_capacity(count);
        for message in state.ready.drain(..count).collect::<Vec<_>>() {
            let receipt = Uuid::new_v4().to_string();
            state.outstanding.insert(receipt.clone(), message.clone());
            deliveries.push(Delivery { message, receipt });
        }

        state.max_outstanding = state.max_outstanding.max(state.outstanding.len());

        Ok(deliveries)
    }

    async fn acknowledge(&self, receipt: &str) -> Result<(), SourceError> {
        let mut state = self.lock();
        let message = self.take_outstanding(&mut state, receipt, "acknowledge")?;
        state.acked.push(message.id);
        Ok(())
    }

    async fn negative_acknowledge(&self, receipt: &str) -> Result<(), SourceError> {
        let mut state = self.lock();
        let message = self.take_outstanding(&mut state, receipt, "negative_acknowledge")?;
        state.nacked.push(message.id.clone());
        if self.redeliver_on_nack {
            state.ready.push_back(message);
        }
        Ok(())
    }

    async fn check_subscription(&self) -> Result<(), SourceError> {
        if self.exists {
            Ok(())
        } else {
            Err(SourceError::NotFound(self.name.clone()))
        }
    }
}
