//! Alert construction and deduplication
//!
//! Handles:
//! - Rendering anomaly, trend and restart alerts
//! - Suppressing repeats according to an [`AlertDedupPolicy`]

use super::{NamespaceAnomaly, TrendSignal};
use crate::error::StoreError;
use crate::models::{AlertKind, AlertSeverity, MetricType, NewAlert, PodRecord};
use crate::store::Repository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// How repeated alert conditions are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertDedupPolicy {
    /// Every threshold crossing appends a new alert
    #[default]
    Always,
    /// Skip when an unresolved alert for the same namespace, kind, metric
    /// and pod already exists
    SkipUnresolved,
}

impl std::str::FromStr for AlertDedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(AlertDedupPolicy::Always),
            "skip_unresolved" => Ok(AlertDedupPolicy::SkipUnresolved),
            other => Err(format!("unknown alert dedup policy: {}", other)),
        }
    }
}

/// Key for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    namespace: String,
    kind: AlertKind,
    metric: Option<MetricType>,
    pod: Option<String>,
}

impl DedupKey {
    fn of(alert: &NewAlert) -> Self {
        Self {
            namespace: alert.namespace.clone(),
            kind: alert.kind,
            metric: alert.metric_type,
            pod: alert.pod.clone(),
        }
    }
}

/// Builds alerts and applies the dedup policy before they are stored
#[derive(Debug, Clone, Default)]
pub struct Alerter {
    policy: AlertDedupPolicy,
}

impl Alerter {
    pub fn new(policy: AlertDedupPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> AlertDedupPolicy {
        self.policy
    }

    /// Alert for a namespace reading far from its baseline
    pub fn anomaly_alert(
        &self,
        namespace: &str,
        metric: MetricType,
        anomaly: &NamespaceAnomaly,
        created_at: DateTime<Utc>,
    ) -> NewAlert {
        let direction = if anomaly.is_above_expected() {
            "high"
        } else {
            "low"
        };

        NewAlert {
            namespace: namespace.to_string(),
            kind: AlertKind::Anomaly,
            metric_type: Some(metric),
            pod: None,
            severity: AlertSeverity::Anomaly,
            message: format!(
                "Anomaly detected: {} namespace {} usage is unusually {}! \
                 (Current: {:.2}, Average: {:.2}, Z-Score: {:.2})",
                namespace, metric, direction, anomaly.current, anomaly.expected, anomaly.z_score
            ),
            created_at,
        }
    }

    /// Alert for a sustained baseline trend
    pub fn trend_alert(
        &self,
        namespace: &str,
        metric: MetricType,
        trend: &TrendSignal,
        created_at: DateTime<Utc>,
    ) -> NewAlert {
        NewAlert {
            namespace: namespace.to_string(),
            kind: AlertKind::Trend,
            metric_type: Some(metric),
            pod: None,
            severity: AlertSeverity::Warning,
            message: format!(
                "Trend detected: {} namespace {} usage is consistently {} (slope: {:.4})",
                namespace, metric, trend.direction, trend.slope
            ),
            created_at,
        }
    }

    /// Alert for a pod that keeps restarting
    pub fn restart_alert(&self, pod: &PodRecord, created_at: DateTime<Utc>) -> NewAlert {
        NewAlert {
            namespace: pod.namespace.clone(),
            kind: AlertKind::Restart,
            metric_type: None,
            pod: Some(pod.name.clone()),
            severity: AlertSeverity::Warning,
            message: format!("Pod {} restarted {} times", pod.name, pod.restart_count),
            created_at,
        }
    }

    /// Drop candidates the policy suppresses
    ///
    /// With `SkipUnresolved`, repeats inside the same batch are dropped as
    /// well as those matching an unresolved stored alert.
    pub async fn filter(
        &self,
        repository: &dyn Repository,
        candidates: Vec<NewAlert>,
    ) -> Result<Vec<NewAlert>, StoreError> {
        if self.policy == AlertDedupPolicy::Always {
            return Ok(candidates);
        }

        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(candidates.len());
        for alert in candidates {
            let key = DedupKey::of(&alert);
            if seen.contains(&key) {
                continue;
            }
            if repository
                .has_unresolved_alert(
                    &alert.namespace,
                    alert.kind,
                    alert.metric_type,
                    alert.pod.as_deref(),
                )
                .await?
            {
                debug!(
                    namespace = %alert.namespace,
                    kind = ?alert.kind,
                    pod = ?alert.pod,
                    "Suppressing alert, unresolved duplicate exists"
                );
                seen.insert(key);
                continue;
            }
            seen.insert(key);
            kept.push(alert);
        }

        Ok(kept)
    }
}
