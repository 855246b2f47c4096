//! Manager configuration
//!
//! Defines all configurable parameters of the manager: resource naming,
//! consumer artifact, readiness polling, sweep interval and request timeout.

use std::time::Duration;

use spillway_core::EnvironmentConstants;
use spillway_services::StaticConfigSource;

use crate::service::ManagerSettings;

/// Manager configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment embedded in resource names (e.g., "dev")
    pub env_name: String,

    /// Table holding pipeline identifier records
    pub identifiers_table: String,

    /// Bucket and key of the consumer artifact
    pub consumer_bucket: String,
    pub consumer_key: String,

    /// Execution role assumed by every consumer
    pub consumer_role_arn: String,

    /// How often the queue sweep runs
    pub sweep_interval: Duration,

    /// Consumer readiness checks before giving up
    pub readiness_attempts: u32,

    /// Pause between consumer readiness checks
    pub readiness_interval: Duration,

    /// Upper bound on handling one change record or one sweep
    pub request_timeout: Duration,

    /// Configuration ids known to the static listing source
    pub config_ids: String,
}

impl Config {
    /// Creates a configuration with defaults for everything but the names
    pub fn new(env_name: String, identifiers_table: String) -> Self {
        Self {
            env_name,
            identifiers_table,
            consumer_bucket: "spillway-artifacts".to_string(),
            consumer_key: "consumer.zip".to_string(),
            consumer_role_arn: "arn:local:role:spillway-consumer".to_string(),
            sweep_interval: Duration::from_secs(60),
            readiness_attempts: 20,
            readiness_interval: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(30),
            config_ids: String::new(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - ENV_NAME (required)
    /// - IDENTIFIERS_TABLE (required)
    /// - CONSUMER_BUCKET, CONSUMER_KEY (required)
    /// - CONSUMER_ROLE_ARN (required)
    /// - SWEEP_INTERVAL (optional, seconds, default: 60)
    /// - READINESS_ATTEMPTS (optional, default: 20)
    /// - READINESS_INTERVAL_MS (optional, milliseconds, default: 1000)
    /// - REQUEST_TIMEOUT (optional, seconds, default: 30)
    /// - CONFIG_IDS (optional, comma-separated)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from any variable lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| anyhow::anyhow!("{} environment variable not set", key))
        };

        let mut config = Self::new(required("ENV_NAME")?, required("IDENTIFIERS_TABLE")?);
        config.consumer_bucket = required("CONSUMER_BUCKET")?;
        config.consumer_key = required("CONSUMER_KEY")?;
        config.consumer_role_arn = required("CONSUMER_ROLE_ARN")?;

        if let Some(secs) = lookup("SWEEP_INTERVAL").and_then(|s| s.parse::<u64>().ok()) {
            config.sweep_interval = Duration::from_secs(secs);
        }

        if let Some(attempts) = lookup("READINESS_ATTEMPTS").and_then(|s| s.parse::<u32>().ok()) {
            config.readiness_attempts = attempts;
        }

        if let Some(ms) = lookup("READINESS_INTERVAL_MS").and_then(|s| s.parse::<u64>().ok()) {
            config.readiness_interval = Duration::from_millis(ms);
        }

        if let Some(secs) = lookup("REQUEST_TIMEOUT").and_then(|s| s.parse::<u64>().ok()) {
            config.request_timeout = Duration::from_secs(secs);
        }

        config.config_ids = lookup("CONFIG_IDS").unwrap_or_default();

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.env_name.trim().is_empty() {
            anyhow::bail!("env_name cannot be empty");
        }

        if self.identifiers_table.trim().is_empty() {
            anyhow::bail!("identifiers_table cannot be empty");
        }

        if self.consumer_bucket.is_empty() || self.consumer_key.is_empty() {
            anyhow::bail!("consumer artifact bucket and key cannot be empty");
        }

        if self.consumer_role_arn.is_empty() {
            anyhow::bail!("consumer_role_arn cannot be empty");
        }

        if self.sweep_interval.is_zero() {
            anyhow::bail!("sweep_interval must be greater than 0");
        }

        if self.readiness_attempts == 0 {
            anyhow::bail!("readiness_attempts must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        Ok(())
    }

    /// Constants injected into every instruction
    pub fn constants(&self) -> EnvironmentConstants {
        EnvironmentConstants {
            consumer_bucket: self.consumer_bucket.clone(),
            consumer_key: self.consumer_key.clone(),
            consumer_role_arn: self.consumer_role_arn.clone(),
            identifiers_table: self.identifiers_table.clone(),
        }
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            readiness_attempts: self.readiness_attempts,
            readiness_interval: self.readiness_interval,
            ..ManagerSettings::new(self.env_name.clone())
        }
    }

    pub fn config_source(&self) -> StaticConfigSource {
        StaticConfigSource::from_csv(&self.config_ids)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("local".to_string(), "pipeline-identifiers".to_string())
    }
}
