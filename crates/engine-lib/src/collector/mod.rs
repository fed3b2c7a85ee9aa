//! Snapshot collection from the container platform
//!
//! This module provides:
//! - Raw platform record shapes and the [`PlatformSource`] trait
//! - Resource-quantity parsing and snapshot normalization
//! - The periodic collection loop that persists each cycle

mod normalize;
mod quantity;
mod r#loop;

pub use normalize::{normalize_pod, normalize_snapshot};
pub use quantity::{parse_cpu, parse_memory};
pub use r#loop::{
    CollectionConfig, CollectionLoop, CollectionLoopBuilder, CycleReport,
    DEFAULT_COLLECTION_INTERVAL, DEFAULT_RESTART_ALERT_THRESHOLD, DEFAULT_RETRY_BACKOFF,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use async_trait::async_trait;

/// Per-container resource quantities exactly as the platform reports them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawContainer {
    pub cpu_request: Option<String>,
    pub memory_request: Option<String>,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
}

/// Pod as reported by the platform; any field may be missing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPod {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub status: Option<String>,
    pub restart_count: Option<u32>,
    #[serde(default)]
    pub containers: Vec<RawContainer>,
    pub age_hours: Option<f64>,
    pub node_name: Option<String>,
}

/// One namespace worth of raw pod records from a collection cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNamespaceSnapshot {
    pub namespace: String,
    pub timestamp: DateTime<Utc>,
    pub pods: Vec<RawPod>,
}

/// Source of raw per-namespace snapshots
#[async_trait]
pub trait PlatformSource: Send + Sync {
    /// Collect the current state of every tracked namespace
    async fn collect(&self) -> Result<Vec<RawNamespaceSnapshot>>;
}
