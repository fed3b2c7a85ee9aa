//! In-process repository backed by a single lock
//!
//! Holding one write lock per call gives every batch all-or-nothing
//! semantics and keeps readers from seeing a half-written baseline set.

use super::{PruneReport, Repository};
use crate::error::StoreError;
use crate::models::{Alert, AlertKind, Baseline, MetricType, NamespaceSnapshot, NewAlert};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    snapshots: Vec<NamespaceSnapshot>,
    baselines: Vec<Baseline>,
    alerts: Vec<Alert>,
    next_alert_id: u64,
}

impl State {
    fn push_alerts(&mut self, alerts: Vec<NewAlert>) -> Vec<Alert> {
        let mut stored = Vec::with_capacity(alerts.len());
        for alert in alerts {
            self.next_alert_id += 1;
            let row = Alert::from_new(self.next_alert_id, alert);
            stored.push(row.clone());
            self.alerts.push(row);
        }
        stored
    }
}

/// Repository that keeps everything in memory
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots
    pub async fn snapshot_count(&self) -> usize {
        self.state.read().await.snapshots.len()
    }

    /// Number of stored baseline rows, including superseded ones
    pub async fn baseline_count(&self) -> usize {
        self.state.read().await.baselines.len()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert_snapshots(
        &self,
        snapshots: Vec<NamespaceSnapshot>,
    ) -> Result<usize, StoreError> {
        let count = snapshots.len();
        let mut state = self.state.write().await;
        state.snapshots.extend(snapshots);
        debug!(count, total = state.snapshots.len(), "Stored snapshots");
        Ok(count)
    }

    async fn snapshots_since(
        &self,
        since: DateTime<Utc>,
        namespace: Option<&str>,
    ) -> Result<Vec<NamespaceSnapshot>, StoreError> {
        let state = self.state.read().await;
        let mut found: Vec<NamespaceSnapshot> = state
            .snapshots
            .iter()
            .filter(|s| s.timestamp >= since)
            .filter(|s| namespace.map_or(true, |ns| s.namespace == ns))
            .cloned()
            .collect();
        found.sort_by_key(|s| s.timestamp);
        Ok(found)
    }

    async fn latest_per_namespace(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NamespaceSnapshot>, StoreError> {
        let state = self.state.read().await;
        let mut latest: BTreeMap<&str, &NamespaceSnapshot> = BTreeMap::new();

        for snapshot in &state.snapshots {
            if since.is_some_and(|cutoff| snapshot.timestamp < cutoff) {
                continue;
            }
            latest
                .entry(snapshot.namespace.as_str())
                .and_modify(|current| {
                    if snapshot.timestamp >= current.timestamp {
                        *current = snapshot;
                    }
                })
                .or_insert(snapshot);
        }

        Ok(latest.into_values().cloned().collect())
    }

    async fn insert_cycle(
        &self,
        snapshots: Vec<NamespaceSnapshot>,
        alerts: Vec<NewAlert>,
    ) -> Result<(usize, Vec<Alert>), StoreError> {
        let count = snapshots.len();
        let mut state = self.state.write().await;
        state.snapshots.extend(snapshots);
        let stored = state.push_alerts(alerts);
        debug!(
            snapshots = count,
            alerts = stored.len(),
            "Stored collection cycle"
        );
        Ok((count, stored))
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<PruneReport, StoreError> {
        let mut state = self.state.write().await;

        let snapshots_before = state.snapshots.len();
        state.snapshots.retain(|s| s.timestamp >= cutoff);

        // The newest row per namespace metric survives regardless of age
        let mut newest: HashMap<(String, MetricType), DateTime<Utc>> = HashMap::new();
        for b in &state.baselines {
            let entry = newest
                .entry((b.namespace.clone(), b.metric_type))
                .or_insert(b.calculated_at);
            if b.calculated_at > *entry {
                *entry = b.calculated_at;
            }
        }
        let baselines_before = state.baselines.len();
        state.baselines.retain(|b| {
            b.calculated_at >= cutoff
                || newest.get(&(b.namespace.clone(), b.metric_type)) == Some(&b.calculated_at)
        });

        let alerts_before = state.alerts.len();
        state
            .alerts
            .retain(|a| !a.resolved || a.created_at >= cutoff);

        Ok(PruneReport {
            snapshots: snapshots_before - state.snapshots.len(),
            baselines: baselines_before - state.baselines.len(),
            alerts: alerts_before - state.alerts.len(),
        })
    }

    async fn insert_baselines(&self, baselines: Vec<Baseline>) -> Result<usize, StoreError> {
        let count = baselines.len();
        let mut state = self.state.write().await;
        state.baselines.extend(baselines);
        Ok(count)
    }

    async fn latest_baseline(
        &self,
        namespace: &str,
        metric: MetricType,
    ) -> Result<Option<Baseline>, StoreError> {
        let state = self.state.read().await;
        // Later rows win ties on calculated_at
        let latest = state
            .baselines
            .iter()
            .filter(|b| b.namespace == namespace && b.metric_type == metric)
            .fold(None::<&Baseline>, |best, b| match best {
                Some(current) if current.calculated_at > b.calculated_at => Some(current),
                _ => Some(b),
            });
        Ok(latest.cloned())
    }

    async fn insert_alerts(&self, alerts: Vec<NewAlert>) -> Result<Vec<Alert>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.push_alerts(alerts))
    }

    async fn alerts(&self, active_only: bool) -> Result<Vec<Alert>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .alerts
            .iter()
            .filter(|a| !active_only || !a.resolved)
            .cloned()
            .collect())
    }

    async fn has_unresolved_alert(
        &self,
        namespace: &str,
        kind: AlertKind,
        metric: Option<MetricType>,
        pod: Option<&str>,
    ) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(state.alerts.iter().any(|a| {
            !a.resolved
                && a.namespace == namespace
                && a.kind == kind
                && a.metric_type == metric
                && a.pod.as_deref() == pod
        }))
    }

    async fn resolve_alert(&self, id: u64) -> Result<Alert, StoreError> {
        let mut state = self.state.write().await;
        let alert = state
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound { entity: "alert", id })?;
        alert.resolved = true;
        Ok(alert.clone())
    }
}
