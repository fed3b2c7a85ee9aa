//! Query-time pod anomaly scoring

use crate::models::PodRecord;
use crate::snapshot::{SnapshotSet, EPSILON};
use serde::{Deserialize, Serialize};

const CPU_WEIGHT: f64 = 0.4;
const RESTART_WEIGHT: f64 = 0.6;

/// Composite anomaly score for one pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodAnomaly {
    pub pod: String,
    pub namespace: String,
    /// 0-100, how far the request sits above the namespace average
    pub cpu_anomaly: f64,
    /// 0-100, 10 points per restart
    pub restart_anomaly: f64,
    pub score: f64,
}

/// Score a pod against its namespace's average CPU request per pod
pub fn pod_anomaly(pod: &PodRecord, namespace_avg_cpu: f64) -> PodAnomaly {
    let cpu_ratio = pod.cpu_request / namespace_avg_cpu.max(EPSILON);
    let cpu_anomaly = ((cpu_ratio - 1.0) * 30.0).clamp(0.0, 100.0);
    let restart_anomaly = (f64::from(pod.restart_count) * 10.0).clamp(0.0, 100.0);

    PodAnomaly {
        pod: pod.name.clone(),
        namespace: pod.namespace.clone(),
        cpu_anomaly,
        restart_anomaly,
        score: CPU_WEIGHT * cpu_anomaly + RESTART_WEIGHT * restart_anomaly,
    }
}

/// Score every pod in the set, in snapshot order
pub fn pod_anomalies(set: &SnapshotSet) -> Vec<PodAnomaly> {
    set.with_namespace_avg_cpu()
        .flat_map(|(snapshot, avg)| snapshot.pods.iter().map(move |p| pod_anomaly(p, avg)))
        .collect()
}
