//! Connectivity health checks
//!
//! A check fetches subscription metadata and tests that the bucket exists.
//! Neither call pulls, acknowledges or writes anything. Failures are
//! reported as an unhealthy result, never as an error.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SourceError;
use crate::source::SubscriptionSource;
use crate::storage::StorageSink;

/// Shortest interval between liveness checks.
pub const MIN_LIVENESS_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ComponentStatus {
    Healthy,
    Missing(String),
    Unreachable(String),
}

impl ComponentStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ComponentStatus::Healthy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub subscription: ComponentStatus,
    pub bucket: ComponentStatus,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.subscription.is_healthy() && self.bucket.is_healthy()
    }
}

#[derive(Clone)]
pub struct HealthMonitor {
    source: Arc<dyn SubscriptionSource>,
    sink: Arc<dyn StorageSink>,
    healthy: Arc<AtomicBool>,
}

impl HealthMonitor {
    pub fn new(source: Arc<dyn SubscriptionSource>, sink: Arc<dyn StorageSink>) -> Self {
        Self {
            source,
            sink,
            healthy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `true` only when the subscription and the bucket are both reachable.
    pub async fn check(&self) -> bool {
        let report = self.report().await;

        if report.is_healthy() {
            info!(
                subscription = self.source.subscription(),
                bucket = self.sink.bucket(),
                "Health check passed"
            );
        } else {
            error!(
                subscription = ?report.subscription,
                bucket = ?report.bucket,
                "Health check failed"
            );
        }

        report.is_healthy()
    }

    /// Per-component status. Also updates [`HealthMonitor::is_healthy`].
    pub async fn report(&self) -> HealthReport {
        let subscription = match self.source.check_subscription().await {
            Ok(()) => ComponentStatus::Healthy,
            Err(SourceError::NotFound(name)) => {
                ComponentStatus::Missing(format!("subscription {} does not exist", name))
            }
            Err(e) => ComponentStatus::Unreachable(e.to_string()),
        };

        let bucket = match self.sink.bucket_exists().await {
            Ok(true) => ComponentStatus::Healthy,
            Ok(false) => {
                ComponentStatus::Missing(format!("bucket {} does not exist", self.sink.bucket()))
            }
            Err(e) => ComponentStatus::Unreachable(e.to_string()),
        };

        let report = HealthReport { subscription, bucket };
        self.healthy.store(report.is_healthy(), Ordering::Relaxed);

        report
    }

    /// Result of the most recent check; `false` before the first one.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Re-run the check every `interval` on its own task until `ct` is
    /// cancelled. Only transitions are logged at warn/info level.
    ///
    /// Intervals below [`MIN_LIVENESS_INTERVAL`] are raised to it.
    pub fn spawn_probe(&self, interval: Duration, ct: CancellationToken) -> JoinHandle<()> {
        let monitor = self.clone();
        let interval = interval.max(MIN_LIVENESS_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; startup already ran a check.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ct.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let was_healthy = monitor.is_healthy();
                let report = monitor.report().await;

                match (was_healthy, report.is_healthy()) {
                    (true, false) => warn!(
                        subscription = ?report.subscription,
                        bucket = ?report.bucket,
                        "Liveness probe failed"
                    ),
                    (false, true) => info!("Liveness probe recovered"),
                    _ => debug!(healthy = report.is_healthy(), "Liveness probe"),
                }
            }

            debug!("Liveness probe stopped");
        })
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("subscription", &self.source.subscription())
            .field("bucket", &self.sink.bucket())
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::source::MemorySubscription;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_healthy_when_both_exist() {
        let monitor = HealthMonitor::new(
            Arc::new(MemorySubscription::new("orders")),
            Arc::new(MemoryStorage::new("archive")),
        );

        assert!(!monitor.is_healthy());
        assert!(monitor.check().await);
        assert!(monitor.is_healthy());
    }

    #[tokio::test]
    async fn test_missing_bucket_is_unhealthy() {
        let monitor = HealthMonitor::new(
            Arc::new(MemorySubscription::new("orders")),
            Arc::new(MemoryStorage::missing("archive")),
        );

        let report = monitor.report().await;

        assert!(report.subscription.is_healthy());
        assert!(matches!(report.bucket, ComponentStatus::Missing(_)));
        assert!(!monitor.check().await);
    }

    #[tokio::test]
    async fn test_missing_subscription_is_unhealthy() {
        let monitor = HealthMonitor::new(
            Arc::new(MemorySubscription::missing("orders")),
            Arc::new(MemoryStorage::new("archive")),
        );

        assert!(!monitor.check().await);
    }

    #[tokio::test]
    async fn test_errors_are_reported_not_raised() {
        let storage = MemoryStorage::new("archive");
        storage.fail_exists(StorageError::request("head_bucket", "access denied"));
        let monitor = HealthMonitor::new(Arc::new(MemorySubscription::new("orders")), Arc::new(storage));

        let report = monitor.report().await;

        assert_eq!(
            report.bucket,
            ComponentStatus::Unreachable(
                StorageError::request("head_bucket", "access denied").to_string()
            )
        );
        assert!(!report.is_healthy());
    }

    #[tokio::test]
    async fn test_zero_liveness_interval_is_raised_to_minimum() {
        let storage = Arc::new(MemoryStorage::new("archive"));
        let monitor = HealthMonitor::new(Arc::new(MemorySubscription::new("orders")), storage.clone());
        assert!(monitor.check().await);

        let ct = CancellationToken::new();
        let probe = monitor.spawn_probe(Duration::ZERO, ct.clone());

        storage.fail_exists(StorageError::request("head_bucket", "access denied"));
        tokio::time::timeout(Duration::from_secs(5), async {
            while monitor.is_healthy() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("failing bucket should be noticed");

        ct.cancel();
        probe.await.unwrap();
    }
}
