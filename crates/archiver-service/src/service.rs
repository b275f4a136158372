//! Service wiring
//!
//! [`Archiver`] gates startup on a health check, optionally keeps a liveness
//! probe running beside the pull loop, and runs the ingestion controller
//! until cancellation.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, HealthConfig, PipelineConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::health::HealthMonitor;
use crate::pipeline::{ControllerOptions, IngestionController, MessageProcessor};
use crate::source::{SqsSubscription, SubscriptionSource};
use crate::storage::{S3Storage, StorageSink};

pub struct Archiver {
    health: HealthMonitor,
    controller: IngestionController,
    health_config: HealthConfig,
}

impl Archiver {
    pub fn new(
        source: Arc<dyn SubscriptionSource>,
        sink: Arc<dyn StorageSink>,
        pipeline: &PipelineConfig,
        health_config: HealthConfig,
    ) -> Self {
        let processor = MessageProcessor::new(sink.clone(), pipeline.malformed_policy);
        let controller =
            IngestionController::new(source.clone(), processor, ControllerOptions::from(pipeline));

        Self {
            health: HealthMonitor::new(source, sink),
            controller,
            health_config,
        }
    }

    /// Build the SQS source and S3 sink described by `config`.
    pub async fn from_config(config: Config) -> Self {
        let source = SqsSubscription::new(config.subscription).await;
        let sink = S3Storage::new(config.storage).await;

        Self::new(Arc::new(source), Arc::new(sink), &config.pipeline, config.health)
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn controller(&self) -> &IngestionController {
        &self.controller
    }

    /// Check connectivity, then pull until `ct` is cancelled.
    ///
    /// A failed check returns [`ServiceError::Connectivity`] before any pull.
    pub async fn run(&self, ct: CancellationToken) -> ServiceResult<()> {
        if !self.health.check().await {
            return Err(ServiceError::Connectivity(
                "subscription or bucket unavailable".to_string(),
            ));
        }

        let probe_ct = ct.child_token();
        let probe = self.health_config.probe_interval().map(|interval| {
            info!(interval_secs = interval.as_secs(), "Starting liveness probe");
            self.health.spawn_probe(interval, probe_ct.clone())
        });

        let result = self.controller.run(ct).await;

        probe_ct.cancel();
        if let Some(handle) = probe {
            if let Err(e) = handle.await {
                warn!(error = %e, "Liveness probe task ended abnormally");
            }
        }

        result
    }
}
