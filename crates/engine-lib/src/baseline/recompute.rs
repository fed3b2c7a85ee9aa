//! Periodic baseline recomputation
//!
//! Each cycle reads the look-back window, derives one baseline per
//! (namespace, metric) and appends the whole batch in one write.

use super::{window_start, SeriesStats};
use crate::error::EngineResult;
use crate::models::{Baseline, MetricType, NamespaceSnapshot};
use crate::store::Repository;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Minimum snapshots across all namespaces before a cycle computes anything
pub const MIN_SNAPSHOTS_FOR_BASELINE: usize = 10;

/// Default look-back window (7 days)
pub const DEFAULT_BASELINE_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for baseline recomputation
#[derive(Debug, Clone)]
pub struct BaselineConfig {
    /// History window the statistics are computed over
    pub window: Duration,
    /// Minimum total snapshots required to run
    pub min_snapshots: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_BASELINE_WINDOW,
            min_snapshots: MIN_SNAPSHOTS_FOR_BASELINE,
        }
    }
}

/// Result of one recompute cycle
#[derive(Debug, Clone, PartialEq)]
pub enum BaselineOutcome {
    Computed(Vec<Baseline>),
    /// Not enough history yet; nothing was written
    InsufficientData { found: usize, required: usize },
}

impl BaselineOutcome {
    pub fn baselines(&self) -> &[Baseline] {
        match self {
            BaselineOutcome::Computed(baselines) => baselines,
            BaselineOutcome::InsufficientData { .. } => &[],
        }
    }
}

/// Derive baselines from a window of snapshots
///
/// Every baseline in the batch shares `calculated_at`.
pub fn compute_baselines(
    history: &[NamespaceSnapshot],
    calculated_at: DateTime<Utc>,
    min_snapshots: usize,
) -> BaselineOutcome {
    if history.len() < min_snapshots {
        return BaselineOutcome::InsufficientData {
            found: history.len(),
            required: min_snapshots,
        };
    }

    let mut by_namespace: BTreeMap<&str, Vec<&NamespaceSnapshot>> = BTreeMap::new();
    for snapshot in history {
        by_namespace
            .entry(snapshot.namespace.as_str())
            .or_default()
            .push(snapshot);
    }

    let mut baselines = Vec::with_capacity(by_namespace.len() * MetricType::ALL.len());
    for (namespace, snapshots) in by_namespace {
        for metric in MetricType::ALL {
            let points: Vec<(f64, f64)> = snapshots
                .iter()
                .map(|s| (s.timestamp.timestamp_millis() as f64 / 1000.0, s.total(metric)))
                .collect();

            let Some(stats) = SeriesStats::from_points(&points) else {
                continue;
            };

            baselines.push(Baseline {
                namespace: namespace.to_string(),
                metric_type: metric,
                avg_value: stats.mean,
                std_dev: stats.std_dev,
                min_value: stats.min,
                max_value: stats.max,
                trend_slope: stats.slope,
                sample_count: stats.count,
                calculated_at,
            });
        }
    }

    BaselineOutcome::Computed(baselines)
}

/// Recomputes and stores baselines under a single-writer lock
pub struct BaselineRecomputer {
    repository: Arc<dyn Repository>,
    config: BaselineConfig,
    cycle_lock: Mutex<()>,
}

impl BaselineRecomputer {
    pub fn new(repository: Arc<dyn Repository>, config: BaselineConfig) -> Self {
        Self {
            repository,
            config,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    /// Run one cycle; a second caller waits until the first has committed
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> EngineResult<BaselineOutcome> {
        let _guard = self.cycle_lock.lock().await;

        let since = window_start(now, self.config.window);
        let history = self.repository.snapshots_since(since, None).await?;
        let outcome = compute_baselines(&history, now, self.config.min_snapshots);

        match &outcome {
            BaselineOutcome::InsufficientData { found, required } => {
                warn!(
                    found = *found,
                    required = *required,
                    "Insufficient data for baselines, skipping cycle"
                );
            }
            BaselineOutcome::Computed(baselines) => {
                let stored = self.repository.insert_baselines(baselines.clone()).await?;
                info!(
                    baselines = stored,
                    snapshots = history.len(),
                    "Baselines recalculated"
                );
            }
        }

        Ok(outcome)
    }
}
