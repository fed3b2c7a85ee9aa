//! Baseline scheduling loop
//!
//! Recomputes baselines and then runs anomaly detection on a fixed interval.
//! A failed cycle waits out the retry backoff before trying again.

use super::{window_start, BaselineOutcome, BaselineRecomputer};
use crate::anomaly::AnomalyDetector;
use crate::collector::DEFAULT_RETRY_BACKOFF;
use crate::error::{EngineError, EngineResult};
use crate::health::{components, HealthRegistry};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::store::{PruneReport, Repository};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info};

/// Default interval between baseline cycles (1 hour)
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// What one scheduler cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerReport {
    pub baselines_computed: usize,
    pub skipped: bool,
    pub alerts_created: usize,
    pub pruned: PruneReport,
}

/// Retention pruning applied after each successful cycle
struct Retention {
    repository: Arc<dyn Repository>,
    keep: Duration,
}

/// Runs [`BaselineRecomputer`] then [`AnomalyDetector`] periodically
pub struct BaselineScheduler {
    recomputer: Arc<BaselineRecomputer>,
    detector: Arc<AnomalyDetector>,
    interval: Duration,
    retry_backoff: Duration,
    retention: Option<Retention>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl BaselineScheduler {
    pub fn new(recomputer: Arc<BaselineRecomputer>, detector: Arc<AnomalyDetector>) -> Self {
        Self {
            recomputer,
            detector,
            interval: DEFAULT_STATS_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            retention: None,
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::default(),
            health: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Drop history older than `keep` after each cycle
    pub fn with_retention(mut self, repository: Arc<dyn Repository>, keep: Duration) -> Self {
        self.retention = Some(Retention { repository, keep });
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run one recompute and detection pass
    pub async fn run_once(&self, now: DateTime<Utc>) -> EngineResult<SchedulerReport> {
        let start = Instant::now();

        let outcome = self.recomputer.run_cycle(now).await?;
        let alerts = self.detector.run_cycle(now).await?;

        let pruned = match &self.retention {
            Some(retention) => {
                let cutoff = window_start(now, retention.keep);
                retention.repository.prune_before(cutoff).await?
            }
            None => PruneReport::default(),
        };
        if pruned.total() > 0 {
            debug!(
                snapshots = pruned.snapshots,
                baselines = pruned.baselines,
                alerts = pruned.alerts,
                "Pruned expired history"
            );
        }

        let elapsed = start.elapsed();
        self.metrics.observe_baseline_latency(elapsed.as_secs_f64());
        self.metrics.add_alerts_created(alerts.len());
        if matches!(outcome, BaselineOutcome::InsufficientData { .. }) {
            self.metrics.inc_baseline_skips();
        }
        self.logger
            .log_baseline_cycle(&outcome, alerts.len(), elapsed.as_millis());
        for alert in &alerts {
            self.logger.log_alert(alert);
        }

        Ok(SchedulerReport {
            baselines_computed: outcome.baselines().len(),
            skipped: matches!(outcome, BaselineOutcome::InsufficientData { .. }),
            alerts_created: alerts.len(),
            pruned,
        })
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting baseline scheduler"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once(Utc::now()).await {
                        Ok(_) => {
                            if let Some(health) = &self.health {
                                health.set_healthy(components::BASELINE).await;
                                health.set_healthy(components::STORE).await;
                            }
                        }
                        Err(e) => {
                            self.metrics.inc_baseline_errors();
                            self.logger.log_cycle_failure(
                                components::BASELINE,
                                &e,
                                self.retry_backoff.as_secs(),
                            );
                            if let Some(health) = &self.health {
                                health.set_degraded(components::BASELINE, e.to_string()).await;
                                if let EngineError::Persistence(store_err) = &e {
                                    health
                                        .set_degraded(components::STORE, store_err.to_string())
                                        .await;
                                }
                            }

                            tokio::select! {
                                _ = sleep(self.retry_backoff) => ticker.reset_immediately(),
                                _ = shutdown.recv() => {
                                    info!("Shutting down baseline scheduler");
                                    break;
                                }
                            }
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down baseline scheduler");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyConfig;
    use crate::baseline::BaselineConfig;
    use crate::models::{Baseline, MetricType, NamespaceSnapshot};
    use crate::snapshot::test_support::pod;
    use crate::store::InMemoryRepository;
    use std::io;
    use std::sync::Mutex;

    /// Log sink shared with a fmt subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn scheduler(repo: Arc<InMemoryRepository>) -> BaselineScheduler {
        let recomputer = Arc::new(BaselineRecomputer::new(
            repo.clone(),
            BaselineConfig::default(),
        ));
        let detector = Arc::new(AnomalyDetector::new(repo, AnomalyConfig::default()));
        BaselineScheduler::new(recomputer, detector)
    }

    #[tokio::test]
    async fn test_run_once_skips_without_history() {
        let repo = Arc::new(InMemoryRepository::new());
        let report = scheduler(repo).run_once(Utc::now()).await.unwrap();

        assert!(report.skipped);
        assert_eq!(report.baselines_computed, 0);
        assert_eq!(report.alerts_created, 0);
    }

    #[tokio::test]
    async fn test_run_once_computes_and_prunes() {
        let repo = Arc::new(InMemoryRepository::new());
        let now = Utc::now();
        let mut snapshots: Vec<NamespaceSnapshot> = (0..12)
            .map(|i| {
                NamespaceSnapshot::from_pods(
                    "web",
                    now - chrono::Duration::minutes(60 - i * 5),
                    vec![pod("web", "a", 1.0, 1.0)],
                )
            })
            .collect();
        snapshots.push(NamespaceSnapshot::from_pods(
            "web",
            now - chrono::Duration::days(40),
            vec![],
        ));
        repo.insert_snapshots(snapshots).await.unwrap();

        let report = scheduler(repo.clone())
            .with_retention(repo.clone(), Duration::from_secs(30 * 24 * 3600))
            .run_once(now)
            .await
            .unwrap();

        assert!(!report.skipped);
        assert_eq!(report.baselines_computed, 2);
        assert_eq!(report.pruned.snapshots, 1);
        assert_eq!(repo.snapshot_count().await, 12);
    }

    #[tokio::test]
    async fn test_each_alert_is_logged_once() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_snapshots(vec![NamespaceSnapshot::from_pods(
            "web",
            Utc::now(),
            vec![pod("web", "a", 5.0, 1.0)],
        )])
        .await
        .unwrap();
        repo.insert_baselines(vec![Baseline {
            namespace: "web".to_string(),
            metric_type: MetricType::Cpu,
            avg_value: 2.0,
            std_dev: 0.5,
            min_value: 1.5,
            max_value: 2.5,
            trend_slope: 0.0,
            sample_count: 20,
            calculated_at: Utc::now(),
        }])
        .await
        .unwrap();

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let report = scheduler(repo).run_once(Utc::now()).await.unwrap();
        assert_eq!(report.alerts_created, 1);

        let output = logs.contents();
        assert_eq!(output.matches("Anomaly detected").count(), 1);
        assert_eq!(output.matches("Alert raised").count(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let repo = Arc::new(InMemoryRepository::new());
        let health = HealthRegistry::new();
        let scheduler = Arc::new(
            scheduler(repo)
                .with_interval(Duration::from_millis(10))
                .with_health(health.clone()),
        );

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(scheduler.run(rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        let status = health.health().await.components[components::BASELINE].status;
        assert_eq!(status, crate::health::ComponentStatus::Healthy);
    }
}
