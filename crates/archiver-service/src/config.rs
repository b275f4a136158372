//! Configuration management
//!
//! The service reads its configuration once, from the environment (and an
//! optional `.env` file), and hands the frozen [`Config`] value to the
//! components that need it. Nothing re-reads the environment afterwards.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};
use crate::pipeline::processor::MalformedPolicy;
use crate::source::sqs::SubscriptionConfig;
use crate::storage::config::StorageConfig;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default flow-control limit (messages pulled but not yet disposed).
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// Default ack deadline in seconds.
pub const DEFAULT_ACK_DEADLINE_SECS: u32 = 60;

/// Longest ack deadline the subscription accepts (twelve hours).
pub const MAX_ACK_DEADLINE_SECS: u32 = 43_200;

/// Default long-poll wait for a pull, in seconds.
pub const DEFAULT_PULL_WAIT_SECS: u32 = 20;

/// Default pause after a pull that returned nothing, in milliseconds.
pub const DEFAULT_EMPTY_PULL_BACKOFF_MS: u64 = 500;

/// Default region for both AWS clients.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub subscription: SubscriptionConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub health: HealthConfig,
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_messages: usize,
    pub worker_count: usize,
    pub empty_pull_backoff_ms: u64,
    pub malformed_policy: MalformedPolicy,
}

impl PipelineConfig {
    pub fn empty_pull_backoff(&self) -> Duration {
        Duration::from_millis(self.empty_pull_backoff_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            worker_count: DEFAULT_MAX_MESSAGES,
            empty_pull_backoff_ms: DEFAULT_EMPTY_PULL_BACKOFF_MS,
            malformed_policy: MalformedPolicy::default(),
        }
    }
}

/// Steady-state health probing. An interval of zero disables the probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthConfig {
    pub probe_interval_secs: u64,
}

impl HealthConfig {
    pub fn probe_interval(&self) -> Option<Duration> {
        (self.probe_interval_secs > 0).then(|| Duration::from_secs(self.probe_interval_secs))
    }
}

impl Config {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> ServiceResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Every missing required variable is reported in a single error.
    pub fn from_lookup<F>(lookup: F) -> ServiceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let project_id = var("PROJECT_ID");
        let subscription = var("SUBSCRIPTION_NAME");
        let bucket = var("BUCKET_NAME");

        let missing: Vec<&str> = [
            ("PROJECT_ID", &project_id),
            ("SUBSCRIPTION_NAME", &subscription),
            ("BUCKET_NAME", &bucket),
        ]
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();

        let (Some(project_id), Some(subscription), Some(bucket)) = (project_id, subscription, bucket)
        else {
            return Err(ServiceError::Config(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        };

        let max_messages = parse_or(&var, "MAX_MESSAGES", DEFAULT_MAX_MESSAGES)?;

        let config = Config {
            subscription: SubscriptionConfig {
                project_id,
                name: subscription,
                ack_deadline_secs: parse_or(&var, "ACK_DEADLINE_SECONDS", DEFAULT_ACK_DEADLINE_SECS)?,
                pull_wait_secs: parse_or(&var, "PULL_WAIT_SECONDS", DEFAULT_PULL_WAIT_SECS)?,
                endpoint: var("SQS_ENDPOINT"),
                region: var("SQS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            },
            storage: StorageConfig {
                bucket,
                endpoint: var("S3_ENDPOINT"),
                region: var("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
                access_key: var("S3_ACCESS_KEY").or_else(|| var("AWS_ACCESS_KEY_ID")),
                secret_key: var("S3_SECRET_KEY").or_else(|| var("AWS_SECRET_ACCESS_KEY")),
                path_style: parse_or(&var, "S3_PATH_STYLE", false)?,
            },
            pipeline: PipelineConfig {
                max_messages,
                worker_count: parse_or(&var, "WORKER_COUNT", max_messages)?,
                empty_pull_backoff_ms: parse_or(
                    &var,
                    "EMPTY_PULL_BACKOFF_MS",
                    DEFAULT_EMPTY_PULL_BACKOFF_MS,
                )?,
                malformed_policy: parse_or(&var, "MALFORMED_POLICY", MalformedPolicy::default())?,
            },
            health: HealthConfig {
                probe_interval_secs: parse_or(&var, "HEALTH_PROBE_INTERVAL_SECONDS", 0)?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> ServiceResult<()> {
        if self.pipeline.max_messages == 0 {
            return Err(ServiceError::Config(
                "MAX_MESSAGES must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.worker_count == 0 {
            return Err(ServiceError::Config(
                "WORKER_COUNT must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.worker_count > self.pipeline.max_messages {
            tracing::warn!(
                worker_count = self.pipeline.worker_count,
                max_messages = self.pipeline.max_messages,
                "WORKER_COUNT exceeds MAX_MESSAGES, extra workers will stay idle"
            );
        }

        if self.subscription.ack_deadline_secs == 0 {
            return Err(ServiceError::Config(
                "ACK_DEADLINE_SECONDS must be greater than 0".to_string(),
            ));
        }

        if self.subscription.ack_deadline_secs > MAX_ACK_DEADLINE_SECS {
            return Err(ServiceError::Config(format!(
                "ACK_DEADLINE_SECONDS must be at most {}, got {}",
                MAX_ACK_DEADLINE_SECS, self.subscription.ack_deadline_secs
            )));
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            return Err(ServiceError::Config(
                "S3_ACCESS_KEY and S3_SECRET_KEY must be set together".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_or<T, F>(var: &F, name: &str, default: T) -> ServiceResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ServiceError::Config(format!("Invalid value for {}: {:?} ({})", name, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("PROJECT_ID", "123456789012"),
            ("SUBSCRIPTION_NAME", "orders"),
            ("BUCKET_NAME", "orders-archive"),
        ]
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup(&required())).unwrap();

        assert_eq!(config.subscription.project_id, "123456789012");
        assert_eq!(config.subscription.name, "orders");
        assert_eq!(config.storage.bucket, "orders-archive");
        assert_eq!(config.pipeline.max_messages, 10);
        assert_eq!(config.pipeline.worker_count, 10);
        assert_eq!(config.subscription.ack_deadline_secs, 60);
        assert_eq!(config.pipeline.malformed_policy, MalformedPolicy::DeadLetter);
        assert_eq!(config.health.probe_interval(), None);
        assert_eq!(config.storage.region, DEFAULT_REGION);
    }

    #[test]
    fn test_missing_subscription_is_config_error() {
        let vars = [("PROJECT_ID", "123456789012"), ("BUCKET_NAME", "orders-archive")];

        let err = Config::from_lookup(lookup(&vars)).unwrap_err();

        assert!(matches!(err, ServiceError::Config(_)));
        assert!(err.to_string().contains("SUBSCRIPTION_NAME"));
        assert!(!err.to_string().contains("BUCKET_NAME"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_all_missing_variables_reported() {
        let err = Config::from_lookup(lookup(&[("SUBSCRIPTION_NAME", "  ")])).unwrap_err();
        let message = err.to_string();

        assert!(message.contains("PROJECT_ID"));
        assert!(message.contains("SUBSCRIPTION_NAME"));
        assert!(message.contains("BUCKET_NAME"));
    }

    #[test]
    fn test_worker_count_follows_max_messages() {
        let mut vars = required();
        vars.push(("MAX_MESSAGES", "25"));

        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.pipeline.max_messages, 25);
        assert_eq!(config.pipeline.worker_count, 25);
    }

    #[test]
    fn test_overrides() {
        let mut vars = required();
        vars.extend([
            ("WORKER_COUNT", "4"),
            ("ACK_DEADLINE_SECONDS", "120"),
            ("MALFORMED_POLICY", "drop"),
            ("HEALTH_PROBE_INTERVAL_SECONDS", "30"),
            ("S3_ENDPOINT", "http://localhost:9000"),
            ("S3_PATH_STYLE", "true"),
            ("S3_ACCESS_KEY", "minioadmin"),
            ("S3_SECRET_KEY", "minioadmin"),
        ]);

        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.pipeline.worker_count, 4);
        assert_eq!(config.subscription.ack_deadline_secs, 120);
        assert_eq!(config.pipeline.malformed_policy, MalformedPolicy::Drop);
        assert_eq!(config.health.probe_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.storage.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(config.storage.path_style);
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        for (name, value) in [("MAX_MESSAGES", "ten"), ("MAX_MESSAGES", "0"), ("WORKER_COUNT", "-1")] {
            let mut vars = required();
            vars.push((name, value));

            let err = Config::from_lookup(lookup(&vars)).unwrap_err();
            assert!(err.to_string().contains(name), "{} = {} should be rejected", name, value);
        }
    }

    #[test]
    fn test_ack_deadline_bounds() {
        for value in ["0", "43201", "4294967295"] {
            let mut vars = required();
            vars.push(("ACK_DEADLINE_SECONDS", value));

            let err = Config::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, ServiceError::Config(_)));
            assert!(err.to_string().contains("ACK_DEADLINE_SECONDS"), "{} should be rejected", value);
        }

        let mut vars = required();
        vars.push(("ACK_DEADLINE_SECONDS", "43200"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.subscription.ack_deadline_secs, MAX_ACK_DEADLINE_SECS);
    }

    #[test]
    fn test_unpaired_credentials_rejected() {
        let mut vars = required();
        vars.push(("S3_ACCESS_KEY", "only-half"));

        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    #[serial]
    fn test_load_reads_process_environment() {
        std::env::set_var("PROJECT_ID", "env-project");
        std::env::set_var("SUBSCRIPTION_NAME", "env-subscription");
        std::env::set_var("BUCKET_NAME", "env-bucket");
        std::env::set_var("MAX_MESSAGES", "3");

        let config = Config::load().unwrap();

        for name in ["PROJECT_ID", "SUBSCRIPTION_NAME", "BUCKET_NAME", "MAX_MESSAGES"] {
            std::env::remove_var(name);
        }

        assert_eq!(config.subscription.name, "env-subscription");
        assert_eq!(config.pipeline.max_messages, 3);
    }
}
