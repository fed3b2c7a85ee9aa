//! Snapshot collection loop
//!
//! Periodically pulls raw namespace state from the platform, normalizes it
//! and persists the snapshots together with their restart alerts.

use super::{normalize_snapshot, PlatformSource};
use crate::anomaly::{AlertDedupPolicy, Alerter};
use crate::error::{EngineError, EngineResult};
use crate::health::{components, HealthRegistry};
use crate::models::NamespaceSnapshot;
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::store::Repository;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info};

/// Default collection interval (5 minutes)
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Wait after a failed cycle before retrying
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Restart count at which a pod raises an alert
pub const DEFAULT_RESTART_ALERT_THRESHOLD: u32 = 5;

/// Configuration for the collection loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub interval: Duration,
    pub retry_backoff: Duration,
    pub restart_alert_threshold: u32,
    pub dedup: AlertDedupPolicy,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_COLLECTION_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            restart_alert_threshold: DEFAULT_RESTART_ALERT_THRESHOLD,
            dedup: AlertDedupPolicy::Always,
        }
    }
}

/// Results from a collection cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub namespaces: usize,
    pub pods: usize,
    pub snapshots_stored: usize,
    pub alerts_created: usize,
}

/// Collection loop that snapshots every tracked namespace
pub struct CollectionLoop {
    source: Arc<dyn PlatformSource>,
    repository: Arc<dyn Repository>,
    config: CollectionConfig,
    alerter: Alerter,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl CollectionLoop {
    pub fn new(
        source: Arc<dyn PlatformSource>,
        repository: Arc<dyn Repository>,
        config: CollectionConfig,
    ) -> Self {
        let alerter = Alerter::new(config.dedup);
        Self {
            source,
            repository,
            config,
            alerter,
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::default(),
            health: None,
        }
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Collect, normalize and persist one cycle
    pub async fn collect_once(&self, now: DateTime<Utc>) -> EngineResult<CycleReport> {
        let start = Instant::now();

        let raw = self
            .source
            .collect()
            .await
            .map_err(|e| EngineError::Platform(format!("{:#}", e)))?;

        let snapshots: Vec<NamespaceSnapshot> = raw.into_iter().map(normalize_snapshot).collect();
        let namespaces = snapshots.len();
        let pods = snapshots.iter().map(|s| s.pod_count()).sum();

        let candidates: Vec<_> = snapshots
            .iter()
            .flat_map(|s| s.pods.iter())
            .filter(|p| p.restart_count >= self.config.restart_alert_threshold)
            .map(|p| self.alerter.restart_alert(p, now))
            .collect();

        let alerts = self
            .alerter
            .filter(self.repository.as_ref(), candidates)
            .await?;
        let (snapshots_stored, stored) = self.repository.insert_cycle(snapshots, alerts).await?;
        for alert in &stored {
            self.logger.log_alert(alert);
        }

        let elapsed = start.elapsed();
        self.metrics.observe_collection_latency(elapsed.as_secs_f64());
        self.metrics.add_snapshots_stored(snapshots_stored);
        self.metrics.add_alerts_created(stored.len());
        self.metrics.set_namespaces_tracked(namespaces);
        self.logger
            .log_collection_cycle(namespaces, pods, stored.len(), elapsed.as_millis());

        Ok(CycleReport {
            namespaces,
            pods,
            snapshots_stored,
            alerts_created: stored.len(),
        })
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting snapshot collection loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.collect_once(Utc::now()).await {
                        Ok(report) => {
                            debug!(
                                namespaces = report.namespaces,
                                snapshots = report.snapshots_stored,
                                "Collection cycle stored"
                            );
                            if let Some(health) = &self.health {
                                health.set_healthy(components::COLLECTOR).await;
                                health.set_healthy(components::STORE).await;
                            }
                        }
                        Err(e) => {
                            self.metrics.inc_collection_errors();
                            self.logger.log_cycle_failure(
                                components::COLLECTOR,
                                &e,
                                self.config.retry_backoff.as_secs(),
                            );
                            if let Some(health) = &self.health {
                                health.set_degraded(components::COLLECTOR, e.to_string()).await;
                                if let EngineError::Persistence(store_err) = &e {
                                    health
                                        .set_degraded(components::STORE, store_err.to_string())
                                        .await;
                                }
                            }

                            tokio::select! {
                                _ = sleep(self.config.retry_backoff) => ticker.reset_immediately(),
                                _ = shutdown.recv() => {
                                    info!("Shutting down snapshot collection loop");
                                    break;
                                }
                            }
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down snapshot collection loop");
                    break;
                }
            }
        }
    }
}

/// Builder for creating the collection loop
pub struct CollectionLoopBuilder {
    source: Option<Arc<dyn PlatformSource>>,
    repository: Option<Arc<dyn Repository>>,
    config: CollectionConfig,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl CollectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            repository: None,
            config: CollectionConfig::default(),
            logger: None,
            health: None,
        }
    }

    pub fn source(mut self, source: Arc<dyn PlatformSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    pub fn restart_alert_threshold(mut self, threshold: u32) -> Self {
        self.config.restart_alert_threshold = threshold;
        self
    }

    pub fn dedup(mut self, policy: AlertDedupPolicy) -> Self {
        self.config.dedup = policy;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Build the collection loop
    pub fn build(self) -> Result<CollectionLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Platform source is required"))?;
        let repository = self
            .repository
            .ok_or_else(|| anyhow::anyhow!("Repository is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Collection interval must be greater than zero");
        }

        let mut collection_loop = CollectionLoop::new(source, repository, self.config);
        if let Some(logger) = self.logger {
            collection_loop.logger = logger;
        }
        collection_loop.health = self.health;
        Ok(collection_loop)
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{RawContainer, RawNamespaceSnapshot, RawPod};
    use crate::error::StoreError;
    use crate::health::ComponentStatus;
    use crate::models::{Alert, AlertKind, Baseline, MetricType, NewAlert};
    use crate::store::{InMemoryRepository, PruneReport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock platform returning a fixed namespace
    struct MockSource {
        call_count: AtomicUsize,
        restarts: u32,
        second_pod_restarts: u32,
        fail: bool,
    }

    impl MockSource {
        fn new(restarts: u32) -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                restarts,
                second_pod_restarts: 0,
                fail: false,
            }
        }

        fn crash_looping(restarts: u32) -> Self {
            Self {
                second_pod_restarts: restarts,
                ..Self::new(restarts)
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(0)
            }
        }
    }

    #[async_trait]
    impl PlatformSource for MockSource {
        async fn collect(&self) -> Result<Vec<RawNamespaceSnapshot>> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("api server unreachable");
            }

            Ok(vec![RawNamespaceSnapshot {
                namespace: "web".to_string(),
                timestamp: Utc::now(),
                pods: vec![
                    RawPod {
                        name: Some("web-1".to_string()),
                        status: Some("Running".to_string()),
                        restart_count: Some(self.restarts),
                        containers: vec![RawContainer {
                            cpu_request: Some("500m".to_string()),
                            memory_request: Some("512Mi".to_string()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    },
                    RawPod {
                        name: Some("web-2".to_string()),
                        status: Some("Pending".to_string()),
                        restart_count: Some(self.second_pod_restarts),
                        ..Default::default()
                    },
                ],
            }])
        }
    }

    #[test]
    fn test_collection_config_default() {
        let config = CollectionConfig::default();
        assert_eq!(config.interval, Duration::from_secs(300));
        assert_eq!(config.retry_backoff, Duration::from_secs(60));
        assert_eq!(config.restart_alert_threshold, 5);
        assert_eq!(config.dedup, AlertDedupPolicy::Always);
    }

    #[test]
    fn test_builder_requires_source() {
        let repo = Arc::new(InMemoryRepository::new());
        assert!(CollectionLoopBuilder::new().repository(repo).build().is_err());
    }

    #[test]
    fn test_builder_rejects_zero_interval() {
        let result = CollectionLoopBuilder::new()
            .source(Arc::new(MockSource::new(0)))
            .repository(Arc::new(InMemoryRepository::new()))
            .interval(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_collect_once_persists_normalized_snapshots() {
        let repo = Arc::new(InMemoryRepository::new());
        let collection_loop = CollectionLoopBuilder::new()
            .source(Arc::new(MockSource::new(0)))
            .repository(repo.clone())
            .build()
            .unwrap();

        let report = collection_loop.collect_once(Utc::now()).await.unwrap();
        assert_eq!(report.namespaces, 1);
        assert_eq!(report.pods, 2);
        assert_eq!(report.snapshots_stored, 1);
        assert_eq!(report.alerts_created, 0);

        let latest = repo.latest_per_namespace(None).await.unwrap();
        assert!((latest[0].total_cpu - 0.5).abs() < 1e-9);
        assert!((latest[0].total_memory - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_restart_alerts_follow_policy() {
        let repo = Arc::new(InMemoryRepository::new());
        let collection_loop = CollectionLoopBuilder::new()
            .source(Arc::new(MockSource::new(7)))
            .repository(repo.clone())
            .dedup(AlertDedupPolicy::SkipUnresolved)
            .build()
            .unwrap();

        let report = collection_loop.collect_once(Utc::now()).await.unwrap();
        assert_eq!(report.alerts_created, 1);
        let alerts = repo.alerts(true).await.unwrap();
        assert_eq!(alerts[0].kind, AlertKind::Restart);
        assert_eq!(alerts[0].message, "Pod web-1 restarted 7 times");

        let report = collection_loop.collect_once(Utc::now()).await.unwrap();
        assert_eq!(report.alerts_created, 0);
        assert_eq!(repo.snapshot_count().await, 2);
    }

    #[tokio::test]
    async fn test_platform_failure_writes_nothing() {
        let repo = Arc::new(InMemoryRepository::new());
        let collection_loop =
            CollectionLoop::new(Arc::new(MockSource::failing()), repo.clone(), CollectionConfig::default());

        let result = collection_loop.collect_once(Utc::now()).await;
        assert!(matches!(result, Err(EngineError::Platform(_))));
        assert_eq!(repo.snapshot_count().await, 0);
    }

    #[tokio::test]
    async fn test_run_retries_after_backoff() {
        let repo = Arc::new(InMemoryRepository::new());
        let source = Arc::new(MockSource::failing());
        let collection_loop = CollectionLoopBuilder::new()
            .source(source.clone())
            .repository(repo)
            .interval(Duration::from_secs(3600))
            .retry_backoff(Duration::from_millis(10))
            .build()
            .unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(collection_loop.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        // The hour-long interval alone would allow a single attempt
        assert!(source.call_count.load(Ordering::SeqCst) >= 2);
    }

    /// Repository that rejects every write touching alerts
    struct FailingAlertWrites {
        inner: InMemoryRepository,
    }

    impl FailingAlertWrites {
        fn unavailable() -> StoreError {
            StoreError::Unavailable("alerts table locked".to_string())
        }
    }

    #[async_trait]
    impl Repository for FailingAlertWrites {
        async fn insert_snapshots(
            &self,
            snapshots: Vec<NamespaceSnapshot>,
        ) -> Result<usize, StoreError> {
            self.inner.insert_snapshots(snapshots).await
        }

        async fn insert_cycle(
            &self,
            snapshots: Vec<NamespaceSnapshot>,
            alerts: Vec<NewAlert>,
        ) -> Result<(usize, Vec<Alert>), StoreError> {
            if !alerts.is_empty() {
                return Err(Self::unavailable());
            }
            self.inner.insert_cycle(snapshots, alerts).await
        }

        async fn snapshots_since(
            &self,
            since: DateTime<Utc>,
            namespace: Option<&str>,
        ) -> Result<Vec<NamespaceSnapshot>, StoreError> {
            self.inner.snapshots_since(since, namespace).await
        }

        async fn latest_per_namespace(
            &self,
            since: Option<DateTime<Utc>>,
        ) -> Result<Vec<NamespaceSnapshot>, StoreError> {
            self.inner.latest_per_namespace(since).await
        }

        async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<PruneReport, StoreError> {
            self.inner.prune_before(cutoff).await
        }

        async fn insert_baselines(&self, baselines: Vec<Baseline>) -> Result<usize, StoreError> {
            self.inner.insert_baselines(baselines).await
        }

        async fn latest_baseline(
            &self,
            namespace: &str,
            metric: MetricType,
        ) -> Result<Option<Baseline>, StoreError> {
            self.inner.latest_baseline(namespace, metric).await
        }

        async fn insert_alerts(&self, _alerts: Vec<NewAlert>) -> Result<Vec<Alert>, StoreError> {
            Err(Self::unavailable())
        }

        async fn alerts(&self, active_only: bool) -> Result<Vec<Alert>, StoreError> {
            self.inner.alerts(active_only).await
        }

        async fn has_unresolved_alert(
            &self,
            namespace: &str,
            kind: AlertKind,
            metric: Option<MetricType>,
            pod: Option<&str>,
        ) -> Result<bool, StoreError> {
            self.inner
                .has_unresolved_alert(namespace, kind, metric, pod)
                .await
        }

        async fn resolve_alert(&self, id: u64) -> Result<Alert, StoreError> {
            self.inner.resolve_alert(id).await
        }
    }

    #[tokio::test]
    async fn test_failed_alert_write_leaves_no_snapshots() {
        let repo = Arc::new(FailingAlertWrites {
            inner: InMemoryRepository::new(),
        });
        let collection_loop = CollectionLoopBuilder::new()
            .source(Arc::new(MockSource::crash_looping(9)))
            .repository(repo.clone())
            .build()
            .unwrap();

        let result = collection_loop.collect_once(Utc::now()).await;
        assert!(matches!(
            result,
            Err(EngineError::Persistence(StoreError::Unavailable(_)))
        ));
        assert_eq!(repo.inner.snapshot_count().await, 0);
        assert!(repo.inner.alerts(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skip_unresolved_alerts_every_crash_looping_pod() {
        let repo = Arc::new(InMemoryRepository::new());
        let collection_loop = CollectionLoopBuilder::new()
            .source(Arc::new(MockSource::crash_looping(9)))
            .repository(repo.clone())
            .dedup(AlertDedupPolicy::SkipUnresolved)
            .build()
            .unwrap();

        let report = collection_loop.collect_once(Utc::now()).await.unwrap();
        assert_eq!(report.alerts_created, 2);
        let messages: Vec<String> = repo
            .alerts(true)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "Pod web-1 restarted 9 times".to_string(),
                "Pod web-2 restarted 9 times".to_string(),
            ]
        );

        let report = collection_loop.collect_once(Utc::now()).await.unwrap();
        assert_eq!(report.alerts_created, 0);
    }

    #[tokio::test]
    async fn test_store_failure_degrades_store_health() {
        let repo = Arc::new(FailingAlertWrites {
            inner: InMemoryRepository::new(),
        });
        let health = HealthRegistry::new();
        health.register(components::STORE).await;
        let collection_loop = CollectionLoopBuilder::new()
            .source(Arc::new(MockSource::new(7)))
            .repository(repo)
            .interval(Duration::from_secs(3600))
            .retry_backoff(Duration::from_secs(3600))
            .health(health.clone())
            .build()
            .unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(collection_loop.run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        let report = health.health().await;
        assert_eq!(
            report.components[components::STORE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            report.components[components::COLLECTOR].status,
            ComponentStatus::Degraded
        );
    }
}
