//! Configuration management.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::jobs::DEFAULT_TIMEZONE;
use crate::telemetry::TelemetryConfig;

const ENV_PREFIX: &str = "JOBSYNC";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Reconciliation configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging and metrics configuration
    #[serde(default)]
    pub observability: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Concurrent job store reads (batch building)
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,

    /// Concurrent scheduler mutations
    #[serde(default = "default_max_concurrent_mutations")]
    pub max_concurrent_mutations: usize,

    /// Concurrent job status writes
    #[serde(default = "default_max_concurrent_status_writes")]
    pub max_concurrent_status_writes: usize,

    /// Capacity of the tenant channel
    #[serde(default = "default_tenant_buffer")]
    pub tenant_buffer: usize,

    /// Capacity of the operation channel
    #[serde(default = "default_operation_buffer")]
    pub operation_buffer: usize,

    /// Capacity of the result channel
    #[serde(default = "default_result_buffer")]
    pub result_buffer: usize,

    /// Reconcile every tenant from the tenant source instead of the single default scope
    #[serde(default)]
    pub multi_tenant: bool,

    /// Production cadence (15 minutes) instead of the test cadence (1 minute)
    #[serde(default)]
    pub production_mode: bool,

    /// Cadence override, e.g. "30s" or "5m"
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,

    /// Timezone attached to registered triggers
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reads: default_max_concurrent_reads(),
            max_concurrent_mutations: default_max_concurrent_mutations(),
            max_concurrent_status_writes: default_max_concurrent_status_writes(),
            tenant_buffer: default_tenant_buffer(),
            operation_buffer: default_operation_buffer(),
            result_buffer: default_result_buffer(),
            multi_tenant: false,
            production_mode: false,
            interval: None,
            timezone: default_timezone(),
        }
    }
}

fn default_max_concurrent_reads() -> usize { 5 }
fn default_max_concurrent_mutations() -> usize { 10 }
fn default_max_concurrent_status_writes() -> usize { 3 }
fn default_tenant_buffer() -> usize { 20 }
fn default_operation_buffer() -> usize { 100 }
fn default_result_buffer() -> usize { 50 }
fn default_timezone() -> String { DEFAULT_TIMEZONE.to_string() }

const PRODUCTION_CADENCE: Duration = Duration::from_secs(15 * 60);
const TEST_CADENCE: Duration = Duration::from_secs(60);

impl SyncConfig {
    /// Time between cycles.
    pub fn cadence(&self) -> Duration {
        match self.interval {
            Some(interval) => interval,
            None if self.production_mode => PRODUCTION_CADENCE,
            None => TEST_CADENCE,
        }
    }

    /// Reject limits and capacities that would stall the pipeline.
    pub fn validate(&self) -> Result<()> {
        let bounds = [
            ("sync.max_concurrent_reads", self.max_concurrent_reads),
            ("sync.max_concurrent_mutations", self.max_concurrent_mutations),
            ("sync.max_concurrent_status_writes", self.max_concurrent_status_writes),
            ("sync.tenant_buffer", self.tenant_buffer),
            ("sync.operation_buffer", self.operation_buffer),
            ("sync.result_buffer", self.result_buffer),
        ];

        if let Some((name, _)) = bounds.iter().find(|(_, value)| *value == 0) {
            return Err(SyncError::invalid_configuration(format!(
                "{} must be at least 1",
                name
            )));
        }

        if self.interval.is_some_and(|i| i.is_zero()) {
            return Err(SyncError::invalid_configuration(
                "sync.interval must be greater than zero",
            ));
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from the environment (`JOBSYNC__SYNC__MULTI_TENANT=true`).
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(environment())
            .build()?;

        Self::finish(config)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(environment())
            .build()?;

        Self::finish(config)
    }

    fn finish(config: config::Config) -> Result<Self> {
        let cfg: Config = config.try_deserialize()?;
        cfg.sync.validate()?;
        Ok(cfg)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.max_concurrent_reads, 5);
        assert_eq!(config.max_concurrent_mutations, 10);
        assert_eq!(config.max_concurrent_status_writes, 3);
        assert_eq!(
            (config.tenant_buffer, config.operation_buffer, config.result_buffer),
            (20, 100, 50)
        );
        assert!(!config.multi_tenant);
        assert_eq!(config.timezone, "UTC");
    }

    #[test]
    fn test_cadence() {
        let mut config = SyncConfig::default();
        assert_eq!(config.cadence(), Duration::from_secs(60));

        config.production_mode = true;
        assert_eq!(config.cadence(), Duration::from_secs(900));

        config.interval = Some(Duration::from_secs(5));
        assert_eq!(config.cadence(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = SyncConfig {
            max_concurrent_mutations: 0,
            ..SyncConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.message().contains("sync.max_concurrent_mutations"));

        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_interval_deserialize() {
        let config: SyncConfig = serde_json::from_str(r#"{ "interval": "30s" }"#).unwrap();
        assert_eq!(config.interval, Some(Duration::from_secs(30)));
        assert_eq!(config.cadence(), Duration::from_secs(30));
    }
}
