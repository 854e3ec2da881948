//! Prometheus metrics for reconciliation cycles.
//!
//! Metrics are recorded with the `metrics` facade at the call sites; this
//! module installs the Prometheus recorder and describes every series:
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `jobsync_cycles_total` | counter | `outcome` |
//! | `jobsync_cycle_duration_seconds` | histogram | |
//! | `jobsync_operations_total` | counter | `kind`, `outcome` |
//! | `jobsync_operation_duration_seconds` | histogram | `kind` |
//! | `jobsync_tenant_failures_total` | counter | |
//! | `jobsync_status_writes_total` | counter | `kind` |
//! | `jobsync_errors_total` | counter | `code`, `category` |
//! | `jobsync_limiter_peak_in_flight` | gauge | `limiter` |

use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::sync::LimiterStats;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Address to serve `/metrics` on; no listener when unset
    #[serde(default)]
    pub listen: Option<SocketAddr>,

    /// Histogram buckets for durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: None,
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
}

/// Handle to the installed recorder.
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry with no recorder installed.
    pub fn disabled() -> Self {
        Self {
            prometheus_handle: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Initialize the metrics subsystem.
///
/// With `listen` set the exporter also serves the scrape endpoint, which
/// needs a running tokio runtime.
///
/// # Errors
///
/// Returns an error if the buckets are invalid or a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = match config.listen {
        Some(addr) => {
            let (recorder, exporter) = builder.with_http_listener(addr).build()?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;
            tokio::spawn(exporter);
            handle
        }
        None => builder.install_recorder()?,
    };

    register_metric_descriptions();

    tracing::info!(
        service_name = %service_name,
        listen = ?config.listen,
        "Metrics initialized"
    );

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

/// Register all metric descriptions.
fn register_metric_descriptions() {
    describe_counter!("jobsync_cycles_total", "Reconciliation cycles by outcome");
    describe_histogram!(
        "jobsync_cycle_duration_seconds",
        "Reconciliation cycle duration in seconds"
    );

    describe_counter!(
        "jobsync_operations_total",
        "Scheduler operations applied, by kind and outcome"
    );
    describe_histogram!(
        "jobsync_operation_duration_seconds",
        "Scheduler operation duration in seconds"
    );

    describe_counter!(
        "jobsync_tenant_failures_total",
        "Tenants whose state could not be read"
    );
    describe_counter!("jobsync_status_writes_total", "Job status writes by kind");
    describe_counter!("jobsync_errors_total", "Errors by code and category");

    describe_gauge!(
        "jobsync_limiter_peak_in_flight",
        "Peak concurrent holders of a limiter during the last cycle"
    );
}

/// Publish the peak usage of each limiter after a cycle.
pub fn record_limiter_peaks(stats: &[LimiterStats]) {
    for s in stats {
        gauge!("jobsync_limiter_peak_in_flight", "limiter" => s.name.clone())
            .set(s.peak_in_flight as f64);
    }
}
