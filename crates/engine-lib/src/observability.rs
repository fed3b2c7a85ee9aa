//! Observability infrastructure for the signal engine
//!
//! Provides:
//! - Prometheus metrics for the engine's own cycles (latency, throughput, errors)
//! - Structured JSON logging with tracing

use crate::baseline::BaselineOutcome;
use crate::models::{Alert, AlertKind};
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for cycle latency (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    collection_latency_seconds: Histogram,
    baseline_latency_seconds: Histogram,
    snapshots_stored: IntCounter,
    alerts_created: IntCounter,
    collection_errors: IntCounter,
    baseline_errors: IntCounter,
    baseline_skips: IntCounter,
    namespaces_tracked: IntGauge,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "kubepocket_engine_collection_latency_seconds",
                "Time spent collecting and storing one snapshot cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            baseline_latency_seconds: register_histogram!(
                "kubepocket_engine_baseline_latency_seconds",
                "Time spent recomputing baselines and running detection",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register baseline_latency_seconds"),

            snapshots_stored: register_int_counter!(
                "kubepocket_engine_snapshots_stored_total",
                "Namespace snapshots persisted"
            )
            .expect("Failed to register snapshots_stored"),

            alerts_created: register_int_counter!(
                "kubepocket_engine_alerts_created_total",
                "Alerts persisted by collection and detection cycles"
            )
            .expect("Failed to register alerts_created"),

            collection_errors: register_int_counter!(
                "kubepocket_engine_collection_errors_total",
                "Collection cycles that failed"
            )
            .expect("Failed to register collection_errors"),

            baseline_errors: register_int_counter!(
                "kubepocket_engine_baseline_errors_total",
                "Baseline cycles that failed"
            )
            .expect("Failed to register baseline_errors"),

            baseline_skips: register_int_counter!(
                "kubepocket_engine_baseline_skips_total",
                "Baseline cycles skipped for insufficient data"
            )
            .expect("Failed to register baseline_skips"),

            namespaces_tracked: register_int_gauge!(
                "kubepocket_engine_namespaces_tracked",
                "Namespaces in the most recent collection cycle"
            )
            .expect("Failed to register namespaces_tracked"),
        }
    }
}

/// Handle to the engine's global metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a handle, registering the metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn observe_baseline_latency(&self, duration_secs: f64) {
        self.inner().baseline_latency_seconds.observe(duration_secs);
    }

    pub fn add_snapshots_stored(&self, count: usize) {
        self.inner().snapshots_stored.inc_by(count as u64);
    }

    pub fn add_alerts_created(&self, count: usize) {
        self.inner().alerts_created.inc_by(count as u64);
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    pub fn inc_baseline_errors(&self) {
        self.inner().baseline_errors.inc();
    }

    pub fn inc_baseline_skips(&self) {
        self.inner().baseline_skips.inc();
    }

    pub fn set_namespaces_tracked(&self, count: usize) {
        self.inner().namespaces_tracked.set(count as i64);
    }
}

/// Structured logger for engine events
///
/// Every record carries an `event` tag and the cluster name.
#[derive(Clone)]
pub struct StructuredLogger {
    cluster: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("default")
    }
}

impl StructuredLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Log a completed collection cycle
    pub fn log_collection_cycle(
        &self,
        namespaces: usize,
        pods: usize,
        alerts: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "collection_cycle",
            cluster = %self.cluster,
            namespaces = namespaces,
            pods = pods,
            alerts = alerts,
            elapsed_ms = elapsed_ms,
            "Snapshot collection complete"
        );
    }

    /// Log the outcome of a baseline cycle
    pub fn log_baseline_cycle(&self, outcome: &BaselineOutcome, alerts: usize, elapsed_ms: u128) {
        match outcome {
            BaselineOutcome::Computed(baselines) => {
                info!(
                    event = "baseline_cycle",
                    cluster = %self.cluster,
                    baselines = baselines.len(),
                    alerts = alerts,
                    elapsed_ms = elapsed_ms,
                    "Baselines recalculated"
                );
            }
            BaselineOutcome::InsufficientData { found, required } => {
                info!(
                    event = "baseline_cycle",
                    cluster = %self.cluster,
                    skipped = true,
                    found = *found,
                    required = *required,
                    "Baseline cycle skipped, not enough history"
                );
            }
        }
    }

    /// Log a stored alert
    pub fn log_alert(&self, alert: &Alert) {
        let event = match alert.kind {
            AlertKind::Anomaly => "anomaly_detected",
            AlertKind::Trend => "trend_detected",
            AlertKind::Restart => "pod_restarts",
        };

        warn!(
            event = event,
            cluster = %self.cluster,
            alert_id = alert.id,
            namespace = %alert.namespace,
            metric_type = ?alert.metric_type,
            severity = %alert.severity,
            message = %alert.message,
            "Alert raised"
        );
    }

    /// Log a failed cycle before the retry backoff
    pub fn log_cycle_failure(&self, component: &str, error: &dyn std::fmt::Display, backoff_secs: u64) {
        error!(
            event = "cycle_failed",
            cluster = %self.cluster,
            component = %component,
            error = %error,
            backoff_secs = backoff_secs,
            "Cycle failed, retrying after backoff"
        );
    }

    /// Log engine startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "engine_started",
            cluster = %self.cluster,
            version = %version,
            "KubePocket engine started"
        );
    }

    /// Log engine shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            cluster = %self.cluster,
            reason = %reason,
            "KubePocket engine shutting down"
        );
    }
}
