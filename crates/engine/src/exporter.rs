//! Prometheus exposition of derived results
//!
//! Gauges are rebuilt from the latest snapshots on every scrape, so series
//! for deleted pods and namespaces disappear with them.

use engine_lib::analysis::AnomalyReport;
use engine_lib::cost::{calculate_relative_cost, detect_waste, RelativeCost, WasteReport};
use engine_lib::health::components;
use engine_lib::{
    AnalysisContext, EngineResult, HealthRegistry, MetricType, PodStatus, SnapshotSet,
};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::warn;

/// Everything one scrape reports
pub struct ScrapeData {
    pub snapshots: SnapshotSet,
    pub anomalies: AnomalyReport,
    pub relative_cost: RelativeCost,
    pub waste: WasteReport,
}

/// Renders the `kubepocket_*` gauges plus the engine's own metrics
#[derive(Clone)]
pub struct Exporter {
    analysis: AnalysisContext,
    cluster: String,
    health: Option<HealthRegistry>,
}

impl Exporter {
    pub fn new(analysis: AnalysisContext, cluster: impl Into<String>) -> Self {
        Self {
            analysis,
            cluster: cluster.into(),
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    async fn scrape(&self) -> EngineResult<ScrapeData> {
        let snapshots = self.analysis.latest_snapshots().await?;
        let anomalies = self.analysis.score_set(&snapshots).await?;
        Ok(ScrapeData {
            relative_cost: calculate_relative_cost(&snapshots),
            waste: detect_waste(&snapshots),
            snapshots,
            anomalies,
        })
    }

    /// Text exposition for one scrape
    ///
    /// A failed read still renders, with `kubepocket_up` at 0.
    pub async fn render(&self) -> prometheus::Result<Vec<u8>> {
        let data = match self.scrape().await {
            Ok(data) => {
                if let Some(health) = &self.health {
                    health.set_healthy(components::EXPORTER).await;
                }
                Some(data)
            }
            Err(e) => {
                warn!(error = %e, "Exporter scrape failed");
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::EXPORTER, e.to_string())
                        .await;
                }
                None
            }
        };

        let mut families = gather(&self.cluster, data.as_ref())?;
        families.extend(prometheus::gather());

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(buffer)
    }
}

struct ScrapeGauges {
    up: GaugeVec,
    namespace_cpu: GaugeVec,
    namespace_memory: GaugeVec,
    namespace_restarts: GaugeVec,
    anomaly_score: GaugeVec,
    forecast_cpu: GaugeVec,
    pod_cpu: GaugeVec,
    pod_memory: GaugeVec,
    pod_restarts: GaugeVec,
    pod_running: GaugeVec,
    pod_age: GaugeVec,
    pod_anomaly_score: GaugeVec,
    pod_restart_anomaly: GaugeVec,
    pod_cpu_anomaly: GaugeVec,
    namespace_cost_pct: GaugeVec,
    namespace_cpu_pct: GaugeVec,
    namespace_memory_pct: GaugeVec,
    pod_waste_score: GaugeVec,
    pod_waste_cpu: GaugeVec,
    pod_waste_memory: GaugeVec,
    cluster_waste_pct: GaugeVec,
}

const NAMESPACE_LABELS: &[&str] = &["namespace", "cluster"];
const POD_LABELS: &[&str] = &["pod", "namespace", "cluster"];

fn gauge(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> prometheus::Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl ScrapeGauges {
    fn register(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            up: gauge(
                registry,
                "kubepocket_up",
                "1 when the last scrape read the store",
                &["cluster"],
            )?,
            namespace_cpu: gauge(
                registry,
                "kubepocket_namespace_cpu_cores",
                "Requested CPU cores per namespace",
                NAMESPACE_LABELS,
            )?,
            namespace_memory: gauge(
                registry,
                "kubepocket_namespace_memory_gib",
                "Requested memory per namespace in GiB",
                NAMESPACE_LABELS,
            )?,
            namespace_restarts: gauge(
                registry,
                "kubepocket_namespace_restarts_total",
                "Container restarts per namespace",
                NAMESPACE_LABELS,
            )?,
            anomaly_score: gauge(
                registry,
                "kubepocket_anomaly_score",
                "Namespace anomaly score (0-100)",
                &["namespace", "metric_type", "cluster"],
            )?,
            forecast_cpu: gauge(
                registry,
                "kubepocket_forecast_cpu_cores",
                "Baseline CPU projected over the forecast horizon",
                NAMESPACE_LABELS,
            )?,
            pod_cpu: gauge(
                registry,
                "kubepocket_pod_cpu_cores",
                "Requested CPU cores per pod",
                POD_LABELS,
            )?,
            pod_memory: gauge(
                registry,
                "kubepocket_pod_memory_gib",
                "Requested memory per pod in GiB",
                POD_LABELS,
            )?,
            pod_restarts: gauge(
                registry,
                "kubepocket_pod_restarts_total",
                "Container restarts per pod",
                POD_LABELS,
            )?,
            pod_running: gauge(
                registry,
                "kubepocket_pod_running",
                "1 when the pod is running",
                &["pod", "namespace", "status", "cluster"],
            )?,
            pod_age: gauge(
                registry,
                "kubepocket_pod_age_hours",
                "Pod age in hours",
                POD_LABELS,
            )?,
            pod_anomaly_score: gauge(
                registry,
                "kubepocket_pod_anomaly_score",
                "Composite pod anomaly score (0-100)",
                POD_LABELS,
            )?,
            pod_restart_anomaly: gauge(
                registry,
                "kubepocket_pod_restart_anomaly",
                "Restart component of the pod anomaly score",
                POD_LABELS,
            )?,
            pod_cpu_anomaly: gauge(
                registry,
                "kubepocket_pod_cpu_anomaly",
                "CPU component of the pod anomaly score",
                POD_LABELS,
            )?,
            namespace_cost_pct: gauge(
                registry,
                "kubepocket_namespace_cost_pct",
                "Namespace share of cluster requests (%)",
                NAMESPACE_LABELS,
            )?,
            namespace_cpu_pct: gauge(
                registry,
                "kubepocket_namespace_cpu_pct",
                "Namespace share of cluster CPU requests (%)",
                NAMESPACE_LABELS,
            )?,
            namespace_memory_pct: gauge(
                registry,
                "kubepocket_namespace_memory_pct",
                "Namespace share of cluster memory requests (%)",
                NAMESPACE_LABELS,
            )?,
            pod_waste_score: gauge(
                registry,
                "kubepocket_pod_waste_score",
                "Pod waste score (0-100)",
                POD_LABELS,
            )?,
            pod_waste_cpu: gauge(
                registry,
                "kubepocket_pod_waste_cpu_cores",
                "CPU requested by a wasteful pod",
                POD_LABELS,
            )?,
            pod_waste_memory: gauge(
                registry,
                "kubepocket_pod_waste_memory_gib",
                "Memory requested by a wasteful pod in GiB",
                POD_LABELS,
            )?,
            cluster_waste_pct: gauge(
                registry,
                "kubepocket_cluster_waste_pct",
                "Share of the cluster flagged as waste (%)",
                &["cluster", "resource"],
            )?,
        })
    }

    fn record(&self, cluster: &str, data: &ScrapeData) {
        for snapshot in data.snapshots.snapshots() {
            let ns = snapshot.namespace.as_str();
            self.namespace_cpu
                .with_label_values(&[ns, cluster])
                .set(snapshot.total_cpu);
            self.namespace_memory
                .with_label_values(&[ns, cluster])
                .set(snapshot.total_memory);
            self.namespace_restarts
                .with_label_values(&[ns, cluster])
                .set(snapshot.total_restarts as f64);

            for pod in &snapshot.pods {
                let labels = [pod.name.as_str(), ns, cluster];
                self.pod_cpu.with_label_values(&labels).set(pod.cpu_request);
                self.pod_memory
                    .with_label_values(&labels)
                    .set(pod.memory_request);
                self.pod_restarts
                    .with_label_values(&labels)
                    .set(f64::from(pod.restart_count));
                self.pod_age.with_label_values(&labels).set(pod.age_hours);

                let running = if pod.status == PodStatus::Running { 1.0 } else { 0.0 };
                self.pod_running
                    .with_label_values(&[pod.name.as_str(), ns, pod.status.as_str(), cluster])
                    .set(running);
            }
        }

        for score in &data.anomalies.namespaces {
            let ns = score.namespace.as_str();
            self.anomaly_score
                .with_label_values(&[ns, score.metric_type.as_str(), cluster])
                .set(score.score);
            if score.metric_type == MetricType::Cpu {
                self.forecast_cpu
                    .with_label_values(&[ns, cluster])
                    .set(score.forecast);
            }
        }

        for pod in &data.anomalies.pods {
            let labels = [pod.pod.as_str(), pod.namespace.as_str(), cluster];
            self.pod_anomaly_score.with_label_values(&labels).set(pod.score);
            self.pod_restart_anomaly
                .with_label_values(&labels)
                .set(pod.restart_anomaly);
            self.pod_cpu_anomaly
                .with_label_values(&labels)
                .set(pod.cpu_anomaly);
        }

        for cost in &data.relative_cost.namespaces {
            let labels = [cost.namespace.as_str(), cluster];
            self.namespace_cost_pct
                .with_label_values(&labels)
                .set(cost.cost_pct);
            self.namespace_cpu_pct.with_label_values(&labels).set(cost.cpu_pct);
            self.namespace_memory_pct
                .with_label_values(&labels)
                .set(cost.memory_pct);
        }

        for finding in &data.waste.waste_pods {
            let labels = [finding.pod.as_str(), finding.namespace.as_str(), cluster];
            self.pod_waste_score
                .with_label_values(&labels)
                .set(f64::from(finding.waste_score));
            self.pod_waste_cpu
                .with_label_values(&labels)
                .set(finding.cpu_request);
            self.pod_waste_memory
                .with_label_values(&labels)
                .set(finding.memory_request_gib);
        }

        let summary = &data.waste.summary;
        for (resource, value) in [
            ("pods", summary.waste_pct),
            ("cpu", summary.wasted_cpu_pct),
            ("memory", summary.wasted_memory_pct),
        ] {
            self.cluster_waste_pct
                .with_label_values(&[cluster, resource])
                .set(value);
        }
    }
}

/// Build the scrape gauges in a fresh registry and gather them
///
/// `None` reports only `kubepocket_up` at 0.
pub fn gather(cluster: &str, data: Option<&ScrapeData>) -> prometheus::Result<Vec<MetricFamily>> {
    let registry = Registry::new();
    let gauges = ScrapeGauges::register(&registry)?;

    match data {
        Some(data) => {
            gauges.up.with_label_values(&[cluster]).set(1.0);
            gauges.record(cluster, data);
        }
        None => gauges.up.with_label_values(&[cluster]).set(0.0),
    }

    Ok(registry.gather())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use engine_lib::{NamespaceSnapshot, PodRecord};

    fn pod(namespace: &str, name: &str, status: PodStatus, cpu: f64, restarts: u32) -> PodRecord {
        PodRecord {
            name: name.to_string(),
            namespace: namespace.to_string(),
            status,
            restart_count: restarts,
            cpu_request: cpu,
            memory_request: 0.5,
            cpu_limit: 0.0,
            memory_limit: 0.0,
            age_hours: 30.0,
            node_name: None,
        }
    }

    fn data() -> ScrapeData {
        let snapshots = SnapshotSet::new(vec![
            NamespaceSnapshot::from_pods(
                "shop",
                Utc::now(),
                vec![
                    pod("shop", "web", PodStatus::Running, 1.0, 0),
                    pod("shop", "worker", PodStatus::Failed, 0.5, 7),
                ],
            ),
            NamespaceSnapshot::from_pods(
                "blog",
                Utc::now(),
                vec![pod("blog", "app", PodStatus::Running, 0.5, 0)],
            ),
        ]);

        ScrapeData {
            relative_cost: calculate_relative_cost(&snapshots),
            waste: detect_waste(&snapshots),
            anomalies: AnomalyReport {
                namespaces: Vec::new(),
                pods: engine_lib::anomaly::pod_anomalies(&snapshots),
            },
            snapshots,
        }
    }

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> Option<&'a MetricFamily> {
        families.iter().find(|f| f.get_name() == name)
    }

    #[test]
    fn test_up_is_zero_without_data() {
        let families = gather("test", None).unwrap();
        let up = family(&families, "kubepocket_up").unwrap();
        assert_eq!(up.get_metric()[0].get_gauge().get_value(), 0.0);
        assert!(family(&families, "kubepocket_pod_cpu_cores").is_none());
    }

    #[test]
    fn test_gauges_follow_snapshots() {
        let data = data();
        let families = gather("test", Some(&data)).unwrap();

        let up = family(&families, "kubepocket_up").unwrap();
        assert_eq!(up.get_metric()[0].get_gauge().get_value(), 1.0);

        let pods = family(&families, "kubepocket_pod_cpu_cores").unwrap();
        assert_eq!(pods.get_metric().len(), 3);

        let running = family(&families, "kubepocket_pod_running").unwrap();
        let running_count = running
            .get_metric()
            .iter()
            .filter(|m| m.get_gauge().get_value() == 1.0)
            .count();
        assert_eq!(running_count, 2);

        let cost = family(&families, "kubepocket_namespace_cost_pct").unwrap();
        assert_eq!(cost.get_metric().len(), 2);

        // The failed pod with restarts is flagged
        let waste = family(&families, "kubepocket_pod_waste_score").unwrap();
        assert!(!waste.get_metric().is_empty());

        let cluster_waste = family(&families, "kubepocket_cluster_waste_pct").unwrap();
        assert_eq!(cluster_waste.get_metric().len(), 3);
    }

    #[test]
    fn test_every_series_carries_cluster_label() {
        let data = data();
        let families = gather("prod-eu", Some(&data)).unwrap();
        for family in &families {
            for metric in family.get_metric() {
                assert!(
                    metric
                        .get_label()
                        .iter()
                        .any(|l| l.get_name() == "cluster" && l.get_value() == "prod-eu"),
                    "{} lacks cluster label",
                    family.get_name()
                );
            }
        }
    }
}
