//! Persistence boundary for snapshots, baselines and alerts
//!
//! Every `insert_*` call is one transaction: either the whole batch is
//! stored or nothing is. A collection cycle's snapshots and restart alerts
//! go through [`Repository::insert_cycle`] so they commit together.

mod memory;

pub use memory::InMemoryRepository;

use crate::error::StoreError;
use crate::models::{Alert, AlertKind, Baseline, MetricType, NamespaceSnapshot, NewAlert};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Rows removed by a retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub snapshots: usize,
    pub baselines: usize,
    pub alerts: usize,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.snapshots + self.baselines + self.alerts
    }
}

/// Storage operations the engine depends on
#[async_trait]
pub trait Repository: Send + Sync {
    /// Store one collection cycle's snapshots
    async fn insert_snapshots(&self, snapshots: Vec<NamespaceSnapshot>)
        -> Result<usize, StoreError>;

    /// Snapshots taken at or after `since`, oldest first
    async fn snapshots_since(
        &self,
        since: DateTime<Utc>,
        namespace: Option<&str>,
    ) -> Result<Vec<NamespaceSnapshot>, StoreError>;

    /// Most recent snapshot of every namespace, ordered by namespace name
    async fn latest_per_namespace(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NamespaceSnapshot>, StoreError>;

    /// Store a collection cycle's snapshots and alerts in one transaction
    async fn insert_cycle(
        &self,
        snapshots: Vec<NamespaceSnapshot>,
        alerts: Vec<NewAlert>,
    ) -> Result<(usize, Vec<Alert>), StoreError>;

    /// Drop history older than `cutoff`: snapshots, resolved alerts and
    /// baselines that a newer row has superseded
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<PruneReport, StoreError>;

    /// Append a baseline batch
    async fn insert_baselines(&self, baselines: Vec<Baseline>) -> Result<usize, StoreError>;

    /// Latest baseline for a namespace metric
    async fn latest_baseline(
        &self,
        namespace: &str,
        metric: MetricType,
    ) -> Result<Option<Baseline>, StoreError>;

    /// Append alerts, returning the stored rows
    async fn insert_alerts(&self, alerts: Vec<NewAlert>) -> Result<Vec<Alert>, StoreError>;

    /// All alerts, or only unresolved ones, oldest first
    async fn alerts(&self, active_only: bool) -> Result<Vec<Alert>, StoreError>;

    /// Whether an unresolved alert matches namespace, kind, metric and pod
    async fn has_unresolved_alert(
        &self,
        namespace: &str,
        kind: AlertKind,
        metric: Option<MetricType>,
        pod: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Mark an alert resolved
    async fn resolve_alert(&self, id: u64) -> Result<Alert, StoreError>;
}
