//! Rule-based pod waste classification
//!
//! Rules are evaluated in a fixed order and their scores add up to a capped
//! waste score. Each finding carries one recommendation chosen by precedence.

use crate::models::{PodRecord, PodStatus};
use crate::snapshot::{SnapshotSet, EPSILON};
use serde::{Deserialize, Serialize};

const MAX_WASTE_SCORE: u32 = 100;

/// Waste rule identifiers, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteRule {
    IdlePod,
    Oversized,
    MemoryOverrequest,
    CpuOverrequest,
    CrashLoop,
}

impl WasteRule {
    pub fn score(&self) -> u32 {
        match self {
            WasteRule::IdlePod => 60,
            WasteRule::Oversized => 40,
            WasteRule::MemoryOverrequest => 30,
            WasteRule::CpuOverrequest => 25,
            WasteRule::CrashLoop => 50,
        }
    }

    pub fn severity(&self) -> WasteSeverity {
        match self {
            WasteRule::IdlePod | WasteRule::Oversized | WasteRule::CrashLoop => WasteSeverity::High,
            WasteRule::MemoryOverrequest | WasteRule::CpuOverrequest => WasteSeverity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WasteRule::IdlePod => "idle_pod",
            WasteRule::Oversized => "oversized",
            WasteRule::MemoryOverrequest => "memory_overrequest",
            WasteRule::CpuOverrequest => "cpu_overrequest",
            WasteRule::CrashLoop => "crash_loop",
        }
    }
}

impl std::fmt::Display for WasteRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WasteSeverity {
    Medium,
    High,
}

/// Why a pod was flagged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasteReason {
    #[serde(rename = "type")]
    pub rule: WasteRule,
    pub message: String,
    pub severity: WasteSeverity,
}

impl WasteReason {
    fn new(rule: WasteRule, message: String) -> Self {
        Self {
            rule,
            message,
            severity: rule.severity(),
        }
    }
}

/// A pod that matched at least one waste rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasteFinding {
    pub pod: String,
    pub namespace: String,
    pub status: PodStatus,
    pub cpu_request: f64,
    /// GiB
    #[serde(rename = "memory_request")]
    pub memory_request_gib: f64,
    pub restart_count: u32,
    pub age_hours: f64,
    /// 0-100
    pub waste_score: u32,
    pub reasons: Vec<WasteReason>,
    pub recommendation: String,
}

impl WasteFinding {
    pub fn has_rule(&self, rule: WasteRule) -> bool {
        self.reasons.iter().any(|r| r.rule == rule)
    }

    fn has_any(&self, rules: &[WasteRule]) -> bool {
        rules.iter().any(|rule| self.has_rule(*rule))
    }
}

/// Cluster-wide waste totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WasteSummary {
    pub total_pods_analyzed: usize,
    pub waste_pod_count: usize,
    pub waste_pct: f64,
    pub wasted_cpu_cores: f64,
    pub wasted_memory_gib: f64,
    pub wasted_cpu_pct: f64,
    pub wasted_memory_pct: f64,
}

/// Findings sorted by score, highest first, plus the summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WasteReport {
    pub waste_pods: Vec<WasteFinding>,
    pub summary: WasteSummary,
}

/// Cluster averages every pod is compared against
struct ClusterAverages {
    cpu: f64,
    memory: f64,
}

/// Classify every pod in the set
pub fn detect_waste(set: &SnapshotSet) -> WasteReport {
    let total_pods = set.total_pods();
    if total_pods == 0 {
        return WasteReport::default();
    }

    let averages = ClusterAverages {
        cpu: set.avg_cpu_per_pod(),
        memory: set.avg_memory_per_pod(),
    };

    let mut waste_pods: Vec<WasteFinding> = set
        .pods()
        .filter_map(|(snapshot, pod)| {
            classify_pod(pod, snapshot.total_cpu, snapshot.pod_count(), &averages)
        })
        .collect();
    waste_pods.sort_by(|a, b| b.waste_score.cmp(&a.waste_score));

    let wasted_cpu_cores: f64 = waste_pods
        .iter()
        .filter(|f| {
            f.has_any(&[
                WasteRule::IdlePod,
                WasteRule::CpuOverrequest,
                WasteRule::Oversized,
            ])
        })
        .map(|f| f.cpu_request)
        .sum();
    let wasted_memory_gib: f64 = waste_pods
        .iter()
        .filter(|f| f.has_any(&[WasteRule::IdlePod, WasteRule::MemoryOverrequest]))
        .map(|f| f.memory_request_gib)
        .sum();

    let summary = WasteSummary {
        total_pods_analyzed: total_pods,
        waste_pod_count: waste_pods.len(),
        waste_pct: waste_pods.len() as f64 / total_pods as f64 * 100.0,
        wasted_cpu_cores,
        wasted_memory_gib,
        wasted_cpu_pct: wasted_cpu_cores / set.cluster_total_cpu().max(EPSILON) * 100.0,
        wasted_memory_pct: wasted_memory_gib / set.cluster_total_memory().max(EPSILON) * 100.0,
    };

    WasteReport {
        waste_pods,
        summary,
    }
}

fn classify_pod(
    pod: &PodRecord,
    namespace_cpu: f64,
    namespace_pods: usize,
    averages: &ClusterAverages,
) -> Option<WasteFinding> {
    let cpu = pod.cpu_request;
    let memory = pod.memory_request;
    let restarts = pod.restart_count;
    let stable_and_running = restarts == 0 && pod.status == PodStatus::Running;
    let mut reasons = Vec::new();

    if pod.status.is_idle() && (cpu > 0.0 || memory > 0.0) {
        reasons.push(WasteReason::new(
            WasteRule::IdlePod,
            format!(
                "Pod is {} but blocks {:.2} CPU + {:.2}Gi memory",
                pod.status, cpu, memory
            ),
        ));
    }

    if namespace_cpu > 0.0 && cpu / namespace_cpu > 0.8 && namespace_pods > 1 {
        reasons.push(WasteReason::new(
            WasteRule::Oversized,
            format!(
                "Requests {:.0}% of the namespace CPU on its own",
                cpu / namespace_cpu * 100.0
            ),
        ));
    }

    if memory > averages.memory * 2.5 && stable_and_running && pod.age_hours > 24.0 {
        reasons.push(WasteReason::new(
            WasteRule::MemoryOverrequest,
            format!(
                "Requests {:.1}x the cluster average memory and has never restarted",
                memory / averages.memory.max(EPSILON)
            ),
        ));
    }

    if cpu > averages.cpu * 3.0 && stable_and_running && pod.age_hours > 48.0 {
        reasons.push(WasteReason::new(
            WasteRule::CpuOverrequest,
            format!(
                "Requests {:.1}x the cluster average CPU and has been stable for {:.0} hours",
                cpu / averages.cpu.max(EPSILON),
                pod.age_hours
            ),
        ));
    }

    if restarts >= 10 {
        reasons.push(WasteReason::new(
            WasteRule::CrashLoop,
            format!(
                "{} restarts; the pod keeps crashing and wasting resources",
                restarts
            ),
        ));
    }

    if reasons.is_empty() {
        return None;
    }

    let score: u32 = reasons.iter().map(|r| r.rule.score()).sum();
    let recommendation = recommend(&reasons, cpu, memory, averages);

    Some(WasteFinding {
        pod: pod.name.clone(),
        namespace: pod.namespace.clone(),
        status: pod.status.clone(),
        cpu_request: cpu,
        memory_request_gib: memory,
        restart_count: restarts,
        age_hours: pod.age_hours,
        waste_score: score.min(MAX_WASTE_SCORE),
        reasons,
        recommendation,
    })
}

fn recommend(reasons: &[WasteReason], cpu: f64, memory: f64, averages: &ClusterAverages) -> String {
    let has = |rule: WasteRule| reasons.iter().any(|r| r.rule == rule);

    if has(WasteRule::IdlePod) {
        "Pod is not running; delete it or debug why it is stuck".to_string()
    } else if has(WasteRule::CrashLoop) {
        "Pod keeps crashing; inspect the application logs".to_string()
    } else if has(WasteRule::Oversized) {
        format!(
            "Try a CPU request of {:.2} cores instead of {:.2}",
            cpu * 0.5,
            cpu
        )
    } else if has(WasteRule::MemoryOverrequest) && has(WasteRule::CpuOverrequest) {
        format!(
            "Try lowering CPU to {:.2} cores and memory to {:.2}Gi",
            averages.cpu * 1.5,
            averages.memory * 1.5
        )
    } else if has(WasteRule::MemoryOverrequest) {
        format!(
            "Try a memory request of {:.2}Gi instead of {:.2}Gi",
            averages.memory * 1.5,
            memory
        )
    } else if has(WasteRule::CpuOverrequest) {
        format!(
            "Try a CPU request of {:.2} cores instead of {:.2}",
            averages.cpu * 1.5,
            cpu
        )
    } else {
        "Keep monitoring resource usage".to_string()
    }
}
