//! Common test utilities for archiver integration tests
//!
//! Builds pipelines over the in-memory subscription and storage so tests can
//! publish messages, run the controller and inspect what was written.

#![allow(dead_code)]

use archiver_common::Message;
use archiver_service::config::PipelineConfig;
use archiver_service::pipeline::{
    ControllerOptions, IngestionController, MalformedPolicy, MessageProcessor,
};
use archiver_service::source::MemorySubscription;
use archiver_service::storage::MemoryStorage;
use archiver_service::ServiceResult;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const SUBSCRIPTION: &str = "orders-archive-sub";
pub const BUCKET: &str = "orders-archive";

pub fn publish_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn processed_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap()
}

/// A clock starting at [`processed_at`] that moves one second per reading.
pub fn advancing_clock() -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
    let ticks = AtomicI64::new(0);
    move || processed_at() + chrono::Duration::seconds(ticks.fetch_add(1, Ordering::SeqCst))
}

pub fn message(id: &str, payload: &str) -> Message {
    Message::new(id, payload, publish_time())
}

pub fn options(max_messages: usize, worker_count: usize) -> ControllerOptions {
    ControllerOptions::from(&PipelineConfig {
        max_messages,
        worker_count,
        empty_pull_backoff_ms: 10,
        ..PipelineConfig::default()
    })
}

/// In-memory pipeline wired end to end
pub struct TestPipeline {
    pub source: Arc<MemorySubscription>,
    pub storage: Arc<MemoryStorage>,
    pub controller: Arc<IngestionController>,
}

impl TestPipeline {
    pub fn new(source: MemorySubscription, storage: MemoryStorage, options: ControllerOptions) -> Self {
        Self::with_policy(source, storage, options, MalformedPolicy::default())
    }

    pub fn with_policy(
        source: MemorySubscription,
        storage: MemoryStorage,
        options: ControllerOptions,
        policy: MalformedPolicy,
    ) -> Self {
        Self::assemble(source, storage, options, |storage| {
            MessageProcessor::new(storage, policy).with_clock(processed_at)
        })
    }

    pub fn with_clock<F>(
        source: MemorySubscription,
        storage: MemoryStorage,
        options: ControllerOptions,
        clock: F,
    ) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self::assemble(source, storage, options, |storage| {
            MessageProcessor::new(storage, MalformedPolicy::default()).with_clock(clock)
        })
    }

    fn assemble(
        source: MemorySubscription,
        storage: MemoryStorage,
        options: ControllerOptions,
        processor: impl FnOnce(Arc<MemoryStorage>) -> MessageProcessor,
    ) -> Self {
        let source = Arc::new(source);
        let storage = Arc::new(storage);
        let processor = processor(storage.clone());
        let controller = Arc::new(IngestionController::new(source.clone(), processor, options));

        Self {
            source,
            storage,
            controller,
        }
    }

    pub fn spawn(&self, ct: CancellationToken) -> JoinHandle<ServiceResult<()>> {
        let controller = self.controller.clone();
        tokio::spawn(async move { controller.run(ct).await })
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
