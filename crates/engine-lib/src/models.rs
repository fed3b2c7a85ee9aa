//! Core data models for the signal engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pod lifecycle phase as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PodStatus {
    Running,
    Pending,
    Failed,
    Succeeded,
    Unknown,
    /// Any phase string the engine has no special handling for
    Other(String),
}

impl PodStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PodStatus::Running => "Running",
            PodStatus::Pending => "Pending",
            PodStatus::Failed => "Failed",
            PodStatus::Succeeded => "Succeeded",
            PodStatus::Unknown => "Unknown",
            PodStatus::Other(phase) => phase,
        }
    }

    /// Pending or Failed pods hold reservations without doing work
    pub fn is_idle(&self) -> bool {
        matches!(self, PodStatus::Pending | PodStatus::Failed)
    }
}

impl From<&str> for PodStatus {
    fn from(phase: &str) -> Self {
        match phase {
            "Running" => PodStatus::Running,
            "Pending" => PodStatus::Pending,
            "Failed" => PodStatus::Failed,
            "Succeeded" => PodStatus::Succeeded,
            "Unknown" | "" => PodStatus::Unknown,
            other => PodStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for PodStatus {
    fn from(phase: String) -> Self {
        PodStatus::from(phase.as_str())
    }
}

impl From<PodStatus> for String {
    fn from(status: PodStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for PodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized pod resource record (CPU in cores, memory in GiB)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    pub status: PodStatus,
    pub restart_count: u32,
    pub cpu_request: f64,
    pub memory_request: f64,
    #[serde(default)]
    pub cpu_limit: f64,
    #[serde(default)]
    pub memory_limit: f64,
    pub age_hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

/// One collection cycle's view of a namespace
///
/// Totals are always derived from `pods`; build snapshots through
/// [`NamespaceSnapshot::from_pods`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceSnapshot {
    pub namespace: String,
    pub timestamp: DateTime<Utc>,
    pub pods: Vec<PodRecord>,
    pub total_cpu: f64,
    pub total_memory: f64,
    pub total_restarts: u64,
}

impl NamespaceSnapshot {
    pub fn from_pods(
        namespace: impl Into<String>,
        timestamp: DateTime<Utc>,
        pods: Vec<PodRecord>,
    ) -> Self {
        let total_cpu = pods.iter().map(|p| p.cpu_request).sum();
        let total_memory = pods.iter().map(|p| p.memory_request).sum();
        let total_restarts = pods.iter().map(|p| u64::from(p.restart_count)).sum();

        Self {
            namespace: namespace.into(),
            timestamp,
            pods,
            total_cpu,
            total_memory,
            total_restarts,
        }
    }

    pub fn pod_count(&self) -> usize {
        self.pods.len()
    }

    /// Total for the given metric
    pub fn total(&self, metric: MetricType) -> f64 {
        match metric {
            MetricType::Cpu => self.total_cpu,
            MetricType::Memory => self.total_memory,
        }
    }

    pub fn count_with_status(&self, status: &PodStatus) -> usize {
        self.pods.iter().filter(|p| &p.status == status).count()
    }
}

/// Metric a baseline is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Cpu,
    Memory,
}

impl MetricType {
    pub const ALL: [MetricType; 2] = [MetricType::Cpu, MetricType::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Cpu => "cpu",
            MetricType::Memory => "memory",
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(MetricType::Cpu),
            "memory" | "mem" => Ok(MetricType::Memory),
            other => Err(format!("unknown metric type: {}", other)),
        }
    }
}

/// Rolling statistics for one namespace metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub namespace: String,
    pub metric_type: MetricType,
    pub avg_value: f64,
    pub std_dev: f64,
    pub min_value: f64,
    pub max_value: f64,
    /// Least-squares slope in metric units per second
    pub trend_slope: f64,
    pub sample_count: usize,
    pub calculated_at: DateTime<Utc>,
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Anomaly,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Anomaly => write!(f, "anomaly"),
        }
    }
}

/// What produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Anomaly,
    Trend,
    Restart,
}

/// Alert waiting to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub namespace: String,
    pub kind: AlertKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<MetricType>,
    /// Set for pod-scoped alerts such as restarts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted alert row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub namespace: String,
    pub kind: AlertKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<MetricType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    pub severity: AlertSeverity,
    pub message: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn from_new(id: u64, alert: NewAlert) -> Self {
        Self {
            id,
            namespace: alert.namespace,
            kind: alert.kind,
            metric_type: alert.metric_type,
            pod: alert.pod,
            severity: alert.severity,
            message: alert.message,
            resolved: false,
            created_at: alert.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(name: &str, cpu: f64, memory: f64, restarts: u32) -> PodRecord {
        PodRecord {
            name: name.to_string(),
            namespace: "default".to_string(),
            status: PodStatus::Running,
            restart_count: restarts,
            cpu_request: cpu,
            memory_request: memory,
            cpu_limit: 0.0,
            memory_limit: 0.0,
            age_hours: 1.0,
            node_name: None,
        }
    }

    #[test]
    fn test_snapshot_totals_derived_from_pods() {
        let snapshot = NamespaceSnapshot::from_pods(
            "default",
            Utc::now(),
            vec![pod("a", 0.5, 1.0, 2), pod("b", 1.5, 3.0, 1)],
        );

        assert!((snapshot.total_cpu - 2.0).abs() < 1e-9);
        assert!((snapshot.total_memory - 4.0).abs() < 1e-9);
        assert_eq!(snapshot.total_restarts, 3);
        assert_eq!(snapshot.pod_count(), 2);
    }

    #[test]
    fn test_pod_status_round_trip_preserves_unknown_phases() {
        assert_eq!(PodStatus::from("Pending"), PodStatus::Pending);
        assert_eq!(PodStatus::from(""), PodStatus::Unknown);
        let other = PodStatus::from("Evicted");
        assert_eq!(other, PodStatus::Other("Evicted".to_string()));
        assert_eq!(other.to_string(), "Evicted");

        let json = serde_json::to_string(&PodStatus::Failed).unwrap();
        assert_eq!(json, "\"Failed\"");
    }

    #[test]
    fn test_metric_type_parse() {
        assert_eq!("CPU".parse::<MetricType>().unwrap(), MetricType::Cpu);
        assert_eq!("memory".parse::<MetricType>().unwrap(), MetricType::Memory);
        assert!("disk".parse::<MetricType>().is_err());
    }
}
