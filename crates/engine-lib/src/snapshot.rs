//! Normalized view over the latest snapshot of every namespace
//!
//! Cluster totals and per-pod averages are computed once here and shared by
//! the cost, waste and anomaly analyses.

use crate::models::{NamespaceSnapshot, PodRecord, PodStatus};
use serde::{Deserialize, Serialize};

/// Floor applied to ratio denominators
pub const EPSILON: f64 = 0.001;

/// Latest-per-namespace snapshots plus the aggregates derived from them
#[derive(Debug, Clone, Default)]
pub struct SnapshotSet {
    snapshots: Vec<NamespaceSnapshot>,
    cluster_cpu: f64,
    cluster_memory: f64,
    total_pods: usize,
    namespace_avg_cpu: Vec<f64>,
}

impl SnapshotSet {
    pub fn new(snapshots: Vec<NamespaceSnapshot>) -> Self {
        let cluster_cpu = snapshots.iter().map(|s| s.total_cpu).sum();
        let cluster_memory = snapshots.iter().map(|s| s.total_memory).sum();
        let total_pods = snapshots.iter().map(|s| s.pods.len()).sum();
        let namespace_avg_cpu = snapshots
            .iter()
            .map(|s| s.total_cpu / s.pods.len().max(1) as f64)
            .collect();

        Self {
            snapshots,
            cluster_cpu,
            cluster_memory,
            total_pods,
            namespace_avg_cpu,
        }
    }

    pub fn snapshots(&self) -> &[NamespaceSnapshot] {
        &self.snapshots
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn cluster_total_cpu(&self) -> f64 {
        self.cluster_cpu
    }

    pub fn cluster_total_memory(&self) -> f64 {
        self.cluster_memory
    }

    pub fn total_pods(&self) -> usize {
        self.total_pods
    }

    /// Mean CPU request over every pod in the cluster (0 without pods)
    pub fn avg_cpu_per_pod(&self) -> f64 {
        if self.total_pods == 0 {
            return 0.0;
        }
        self.cluster_cpu / self.total_pods as f64
    }

    /// Mean memory request over every pod in the cluster (0 without pods)
    pub fn avg_memory_per_pod(&self) -> f64 {
        if self.total_pods == 0 {
            return 0.0;
        }
        self.cluster_memory / self.total_pods as f64
    }

    /// Each snapshot paired with its mean CPU request per pod
    pub fn with_namespace_avg_cpu(&self) -> impl Iterator<Item = (&NamespaceSnapshot, f64)> {
        self.snapshots
            .iter()
            .zip(self.namespace_avg_cpu.iter().copied())
    }

    /// Every pod in the cluster alongside its namespace snapshot
    pub fn pods(&self) -> impl Iterator<Item = (&NamespaceSnapshot, &PodRecord)> {
        self.snapshots
            .iter()
            .flat_map(|s| s.pods.iter().map(move |p| (s, p)))
    }
}

/// Cluster-wide totals over the latest snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub total_namespaces: usize,
    pub total_pods: usize,
    pub running_pods: usize,
    pub pending_pods: usize,
    pub failed_pods: usize,
    pub total_cpu: f64,
    pub total_memory: f64,
    pub total_restarts: u64,
    pub active_alerts: usize,
}

impl ClusterSummary {
    pub fn from_set(set: &SnapshotSet, active_alerts: usize) -> Self {
        let count = |status: PodStatus| {
            set.snapshots()
                .iter()
                .map(|s| s.count_with_status(&status))
                .sum::<usize>()
        };

        Self {
            total_namespaces: set.snapshots().len(),
            total_pods: set.total_pods(),
            running_pods: count(PodStatus::Running),
            pending_pods: count(PodStatus::Pending),
            failed_pods: count(PodStatus::Failed),
            total_cpu: set.cluster_total_cpu(),
            total_memory: set.cluster_total_memory(),
            total_restarts: set.snapshots().iter().map(|s| s.total_restarts).sum(),
            active_alerts,
        }
    }
}
