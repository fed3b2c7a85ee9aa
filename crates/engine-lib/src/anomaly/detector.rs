//! Baseline-driven alert generation
//!
//! Compares the latest snapshot of every namespace with its latest baseline
//! and stores the resulting anomaly and trend alerts in one batch. Callers
//! log the returned alerts.

use super::{
    detect_trend, namespace_anomaly, AlertDedupPolicy, Alerter, ANOMALY_Z_THRESHOLD,
    TREND_SLOPE_THRESHOLD,
};
use crate::baseline::window_start;
use crate::error::EngineResult;
use crate::models::{Alert, MetricType, NewAlert};
use crate::store::Repository;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for the anomaly detector
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// Z-score above which an anomaly alert is raised
    pub z_threshold: f64,
    /// Absolute slope above which a trend alert is raised
    pub trend_threshold: f64,
    /// Only snapshots newer than this are evaluated
    pub recent_window: Duration,
    /// Also evaluate memory baselines
    pub check_memory: bool,
    pub dedup: AlertDedupPolicy,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            z_threshold: ANOMALY_Z_THRESHOLD,
            trend_threshold: TREND_SLOPE_THRESHOLD,
            recent_window: Duration::from_secs(60 * 60),
            check_memory: false,
            dedup: AlertDedupPolicy::Always,
        }
    }
}

impl AnomalyConfig {
    fn metrics(&self) -> &'static [MetricType] {
        if self.check_memory {
            &MetricType::ALL
        } else {
            &[MetricType::Cpu]
        }
    }
}

/// Raises alerts from the latest snapshots and baselines
pub struct AnomalyDetector {
    repository: Arc<dyn Repository>,
    config: AnomalyConfig,
    alerter: Alerter,
}

impl AnomalyDetector {
    pub fn new(repository: Arc<dyn Repository>, config: AnomalyConfig) -> Self {
        let alerter = Alerter::new(config.dedup);
        Self {
            repository,
            config,
            alerter,
        }
    }

    /// Evaluate every recent namespace and store the alerts it produces
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> EngineResult<Vec<Alert>> {
        let since = window_start(now, self.config.recent_window);
        let latest = self.repository.latest_per_namespace(Some(since)).await?;

        if latest.is_empty() {
            debug!("No recent snapshots, skipping anomaly detection");
            return Ok(Vec::new());
        }

        let mut candidates: Vec<NewAlert> = Vec::new();
        for snapshot in &latest {
            for &metric in self.config.metrics() {
                let Some(baseline) = self
                    .repository
                    .latest_baseline(&snapshot.namespace, metric)
                    .await?
                else {
                    continue;
                };

                if let Some(anomaly) = namespace_anomaly(snapshot.total(metric), &baseline) {
                    if anomaly.exceeds(self.config.z_threshold) {
                        candidates.push(self.alerter.anomaly_alert(
                            &snapshot.namespace,
                            metric,
                            &anomaly,
                            now,
                        ));
                    }
                }

                if let Some(trend) = detect_trend(&baseline, self.config.trend_threshold) {
                    candidates.push(self.alerter.trend_alert(
                        &snapshot.namespace,
                        metric,
                        &trend,
                        now,
                    ));
                }
            }
        }

        let alerts = self
            .alerter
            .filter(self.repository.as_ref(), candidates)
            .await?;
        if alerts.is_empty() {
            return Ok(Vec::new());
        }

        let stored = self.repository.insert_alerts(alerts).await?;
        info!(
            alerts = stored.len(),
            namespaces = latest.len(),
            "Anomaly detection complete"
        );

        Ok(stored)
    }
}
