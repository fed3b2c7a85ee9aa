//! Query-time analyses over the stored snapshots
//!
//! [`AnalysisContext`] reads from a [`Repository`] and hands the latest
//! snapshots to the pure cost, waste and anomaly functions.

use crate::anomaly::{
    daily_forecast, forecast, namespace_anomaly, pod_anomalies, DailyForecast, PodAnomaly,
    DAILY_FORECAST_HISTORY_DAYS, DEFAULT_FORECAST_HORIZON,
};
use crate::cost::{calculate_relative_cost, detect_waste, RelativeCost, WasteReport};
use crate::error::EngineResult;
use crate::models::{MetricType, NamespaceSnapshot, PodRecord, PodStatus};
use crate::snapshot::{ClusterSummary, SnapshotSet};
use crate::store::Repository;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for query-time analyses
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Horizon of the baseline forecast reported with anomaly scores
    pub forecast_horizon: Duration,
    /// History read by the daily forecast
    pub daily_history_days: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            forecast_horizon: DEFAULT_FORECAST_HORIZON,
            daily_history_days: DAILY_FORECAST_HISTORY_DAYS,
        }
    }
}

/// Relative cost and waste in one response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub relative_cost: RelativeCost,
    pub waste: WasteReport,
}

/// Latest reading of a namespace metric scored against its baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceScore {
    pub namespace: String,
    pub metric_type: MetricType,
    pub current: f64,
    pub baseline_avg: f64,
    pub std_dev: f64,
    pub z_score: f64,
    /// 0-100
    pub score: f64,
    pub is_anomalous: bool,
    pub trend_slope: f64,
    /// Baseline projected over the forecast horizon
    pub forecast: f64,
}

/// Namespace and pod anomaly scores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub namespaces: Vec<NamespaceScore>,
    pub pods: Vec<PodAnomaly>,
}

/// Latest snapshot of a namespace with per-phase pod counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceMetrics {
    pub namespace: String,
    pub timestamp: DateTime<Utc>,
    pub pod_count: usize,
    pub total_cpu: f64,
    pub total_memory: f64,
    pub total_restarts: u64,
    pub running_pods: usize,
    pub pending_pods: usize,
    pub failed_pods: usize,
    pub pods: Vec<PodRecord>,
}

impl From<NamespaceSnapshot> for NamespaceMetrics {
    fn from(snapshot: NamespaceSnapshot) -> Self {
        Self {
            running_pods: snapshot.count_with_status(&PodStatus::Running),
            pending_pods: snapshot.count_with_status(&PodStatus::Pending),
            failed_pods: snapshot.count_with_status(&PodStatus::Failed),
            pod_count: snapshot.pod_count(),
            namespace: snapshot.namespace,
            timestamp: snapshot.timestamp,
            total_cpu: snapshot.total_cpu,
            total_memory: snapshot.total_memory,
            total_restarts: snapshot.total_restarts,
            pods: snapshot.pods,
        }
    }
}

/// Cluster-wide daily averages of snapshot totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub dates: Vec<NaiveDate>,
    pub cpu: Vec<f64>,
    pub memory: Vec<f64>,
}

/// Read side of the engine, shared by the API and the exporter
#[derive(Clone)]
pub struct AnalysisContext {
    repository: Arc<dyn Repository>,
    config: AnalysisConfig,
}

impl AnalysisContext {
    pub fn new(repository: Arc<dyn Repository>, config: AnalysisConfig) -> Self {
        Self { repository, config }
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Latest snapshot of every namespace
    pub async fn latest_snapshots(&self) -> EngineResult<SnapshotSet> {
        let latest = self.repository.latest_per_namespace(None).await?;
        Ok(SnapshotSet::new(latest))
    }

    pub async fn relative_cost(&self) -> EngineResult<RelativeCost> {
        Ok(calculate_relative_cost(&self.latest_snapshots().await?))
    }

    pub async fn waste(&self) -> EngineResult<WasteReport> {
        Ok(detect_waste(&self.latest_snapshots().await?))
    }

    /// Relative cost and waste from the same snapshot set
    pub async fn cost_summary(&self) -> EngineResult<CostSummary> {
        let set = self.latest_snapshots().await?;
        Ok(CostSummary {
            relative_cost: calculate_relative_cost(&set),
            waste: detect_waste(&set),
        })
    }

    /// Score every namespace metric with a baseline, plus every pod
    pub async fn anomaly_scores(&self) -> EngineResult<AnomalyReport> {
        let set = self.latest_snapshots().await?;
        self.score_set(&set).await
    }

    /// Score a snapshot set the caller already holds
    pub async fn score_set(&self, set: &SnapshotSet) -> EngineResult<AnomalyReport> {
        let mut namespaces = Vec::new();
        for snapshot in set.snapshots() {
            for metric in MetricType::ALL {
                let Some(baseline) = self
                    .repository
                    .latest_baseline(&snapshot.namespace, metric)
                    .await?
                else {
                    continue;
                };
                let Some(anomaly) = namespace_anomaly(snapshot.total(metric), &baseline) else {
                    continue;
                };

                namespaces.push(NamespaceScore {
                    namespace: snapshot.namespace.clone(),
                    metric_type: metric,
                    current: anomaly.current,
                    baseline_avg: anomaly.expected,
                    std_dev: anomaly.std_dev,
                    z_score: anomaly.z_score,
                    score: anomaly.score,
                    is_anomalous: anomaly.is_anomalous(),
                    trend_slope: baseline.trend_slope,
                    forecast: forecast(&baseline, self.config.forecast_horizon),
                });
            }
        }

        Ok(AnomalyReport {
            namespaces,
            pods: pod_anomalies(set),
        })
    }

    /// Totals over the latest snapshots plus the active alert count
    pub async fn cluster_summary(&self) -> EngineResult<ClusterSummary> {
        let set = self.latest_snapshots().await?;
        let active_alerts = self.repository.alerts(true).await?.len();
        Ok(ClusterSummary::from_set(&set, active_alerts))
    }

    /// Latest snapshot of every namespace with phase counts
    pub async fn namespace_metrics(&self) -> EngineResult<Vec<NamespaceMetrics>> {
        let latest = self.repository.latest_per_namespace(None).await?;
        Ok(latest.into_iter().map(NamespaceMetrics::from).collect())
    }

    /// Daily average of snapshot totals over the last `days` days
    pub async fn daily_trend(&self, days: u32, now: DateTime<Utc>) -> EngineResult<DailyTrend> {
        let since = days_before(now, i64::from(days));
        let history = self.repository.snapshots_since(since, None).await?;

        let mut by_day: BTreeMap<NaiveDate, (f64, f64, usize)> = BTreeMap::new();
        for snapshot in &history {
            let entry = by_day
                .entry(snapshot.timestamp.date_naive())
                .or_insert((0.0, 0.0, 0));
            entry.0 += snapshot.total_cpu;
            entry.1 += snapshot.total_memory;
            entry.2 += 1;
        }

        let mut trend = DailyTrend::default();
        for (date, (cpu, memory, count)) in by_day {
            trend.dates.push(date);
            trend.cpu.push(cpu / count as f64);
            trend.memory.push(memory / count as f64);
        }
        Ok(trend)
    }

    /// Daily forecast for one namespace metric
    ///
    /// `None` when the namespace lacks enough history.
    pub async fn forecast_daily(
        &self,
        namespace: &str,
        metric: MetricType,
        days: usize,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<DailyForecast>> {
        let since = days_before(now, self.config.daily_history_days);
        let history = self
            .repository
            .snapshots_since(since, Some(namespace))
            .await?;
        Ok(daily_forecast(&history, metric, days))
    }
}

fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    chrono::Duration::try_days(days)
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, AlertSeverity, Baseline, NewAlert};
    use crate::snapshot::test_support::pod;
    use crate::store::InMemoryRepository;

    async fn context_with(snapshots: Vec<NamespaceSnapshot>) -> (AnalysisContext, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_snapshots(snapshots).await.unwrap();
        (
            AnalysisContext::new(repo.clone(), AnalysisConfig::default()),
            repo,
        )
    }

    #[tokio::test]
    async fn test_analyses_read_latest_snapshot_only() {
        let now = Utc::now();
        let (ctx, _) = context_with(vec![
            NamespaceSnapshot::from_pods(
                "web",
                now - chrono::Duration::hours(1),
                vec![pod("web", "old", 10.0, 10.0)],
            ),
            NamespaceSnapshot::from_pods("web", now, vec![pod("web", "new", 1.0, 1.0)]),
            NamespaceSnapshot::from_pods("api", now, vec![pod("api", "a", 3.0, 1.0)]),
        ])
        .await;

        let cost = ctx.relative_cost().await.unwrap();
        assert_eq!(cost.namespaces[0].namespace, "api");
        assert!((cost.cluster_total_cpu - 4.0).abs() < 1e-9);

        let summary = ctx.cost_summary().await.unwrap();
        assert_eq!(summary.relative_cost, cost);
        assert_eq!(summary.waste.summary.total_pods_analyzed, 2);
    }

    #[tokio::test]
    async fn test_empty_store_gives_empty_results() {
        let (ctx, _) = context_with(vec![]).await;

        assert!(ctx.relative_cost().await.unwrap().is_empty());
        assert!(ctx.waste().await.unwrap().waste_pods.is_empty());
        assert_eq!(ctx.anomaly_scores().await.unwrap(), AnomalyReport::default());
        assert_eq!(
            ctx.cluster_summary().await.unwrap(),
            ClusterSummary::default()
        );
    }

    #[tokio::test]
    async fn test_anomaly_scores_include_forecast() {
        let now = Utc::now();
        let (ctx, repo) = context_with(vec![NamespaceSnapshot::from_pods(
            "web",
            now,
            vec![pod("web", "a", 5.0, 1.0)],
        )])
        .await;
        repo.insert_baselines(vec![Baseline {
            namespace: "web".to_string(),
            metric_type: MetricType::Cpu,
            avg_value: 2.0,
            std_dev: 0.5,
            min_value: 1.0,
            max_value: 3.0,
            trend_slope: 0.0,
            sample_count: 12,
            calculated_at: now,
        }])
        .await
        .unwrap();

        let report = ctx.anomaly_scores().await.unwrap();
        assert_eq!(report.namespaces.len(), 1);
        let score = &report.namespaces[0];
        assert!((score.z_score - 6.0).abs() < 1e-9);
        assert_eq!(score.score, 100.0);
        assert!(score.is_anomalous);
        assert!((score.forecast - 2.0).abs() < 1e-9);
        assert_eq!(report.pods.len(), 1);
    }

    #[tokio::test]
    async fn test_cluster_summary_counts_active_alerts() {
        let now = Utc::now();
        let (ctx, repo) = context_with(vec![NamespaceSnapshot::from_pods(
            "web",
            now,
            vec![pod("web", "a", 1.0, 1.0)],
        )])
        .await;
        let stored = repo
            .insert_alerts(vec![
                NewAlert {
                    namespace: "web".to_string(),
                    kind: AlertKind::Restart,
                    metric_type: None,
                    pod: Some("a".to_string()),
                    severity: AlertSeverity::Warning,
                    message: "Pod a restarted 5 times".to_string(),
                    created_at: now,
                };
                2
            ])
            .await
            .unwrap();
        repo.resolve_alert(stored[0].id).await.unwrap();

        let summary = ctx.cluster_summary().await.unwrap();
        assert_eq!(summary.total_pods, 1);
        assert_eq!(summary.running_pods, 1);
        assert_eq!(summary.active_alerts, 1);
    }

    #[tokio::test]
    async fn test_namespace_metrics_and_daily_trend() {
        let now = Utc::now();
        let mut pending = pod("web", "b", 1.0, 1.0);
        pending.status = PodStatus::Pending;
        let (ctx, _) = context_with(vec![
            NamespaceSnapshot::from_pods(
                "web",
                now - chrono::Duration::days(1),
                vec![pod("web", "a", 2.0, 2.0)],
            ),
            NamespaceSnapshot::from_pods("web", now, vec![pod("web", "a", 1.0, 1.0), pending]),
        ])
        .await;

        let metrics = ctx.namespace_metrics().await.unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].pod_count, 2);
        assert_eq!(metrics[0].pending_pods, 1);

        let trend = ctx.daily_trend(7, now).await.unwrap();
        assert_eq!(trend.dates.len(), 2);
        assert_eq!(trend.cpu, vec![2.0, 2.0]);
    }

    #[tokio::test]
    async fn test_forecast_daily_needs_history() {
        let now = Utc::now();
        let (ctx, _) = context_with(vec![NamespaceSnapshot::from_pods(
            "web",
            now,
            vec![pod("web", "a", 1.0, 1.0)],
        )])
        .await;

        assert!(ctx
            .forecast_daily("web", MetricType::Cpu, 7, now)
            .await
            .unwrap()
            .is_none());
    }
}
