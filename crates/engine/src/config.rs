//! Engine configuration

use anyhow::{bail, Context, Result};
use engine_lib::anomaly::{AlertDedupPolicy, AnomalyConfig};
use engine_lib::baseline::BaselineConfig;
use engine_lib::collector::CollectionConfig;
use engine_lib::AnalysisConfig;
use serde::Deserialize;
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Engine configuration
///
/// Read from `KUBEPOCKET_*` environment variables, e.g.
/// `KUBEPOCKET_COLLECTION_INTERVAL_SECS=60`.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Cluster label attached to logs and exported metrics
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// API server port for health, metrics and query routes
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Snapshot collection interval in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Baseline recompute interval in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Wait before retrying a failed cycle, in seconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    /// History window for baselines, in days
    #[serde(default = "default_baseline_window_days")]
    pub baseline_window_days: u64,

    /// Horizon of the baseline forecast, in days
    #[serde(default = "default_forecast_horizon_days")]
    pub forecast_horizon_days: u64,

    /// Snapshots older than this are pruned; 0 keeps everything
    #[serde(default = "default_snapshot_retention_days")]
    pub snapshot_retention_days: u64,

    /// How repeated alert conditions are stored
    #[serde(default)]
    pub alert_dedup: AlertDedupPolicy,

    /// Restart count above which a pod raises a warning alert
    #[serde(default = "default_restart_alert_threshold")]
    pub restart_alert_threshold: u32,

    /// Also raise anomaly and trend alerts for memory
    #[serde(default)]
    pub check_memory_anomalies: bool,

    /// Namespaces starting with any of these are never collected
    #[serde(default = "default_skip_namespace_prefixes")]
    pub skip_namespace_prefixes: Vec<String>,

    /// Kubeconfig context; in-cluster or default config when unset
    #[serde(default)]
    pub kube_context: Option<String>,
}

fn default_cluster_name() -> String {
    "default".to_string()
}

fn default_api_port() -> u16 {
    8001
}

fn default_collection_interval() -> u64 {
    300
}

fn default_stats_interval() -> u64 {
    3600
}

fn default_retry_backoff() -> u64 {
    60
}

fn default_baseline_window_days() -> u64 {
    7
}

fn default_forecast_horizon_days() -> u64 {
    7
}

fn default_snapshot_retention_days() -> u64 {
    30
}

fn default_restart_alert_threshold() -> u32 {
    5
}

fn default_skip_namespace_prefixes() -> Vec<String> {
    vec![
        "kube-".to_string(),
        "minikube".to_string(),
        "kubernetes".to_string(),
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            api_port: default_api_port(),
            collection_interval_secs: default_collection_interval(),
            stats_interval_secs: default_stats_interval(),
            retry_backoff_secs: default_retry_backoff(),
            baseline_window_days: default_baseline_window_days(),
            forecast_horizon_days: default_forecast_horizon_days(),
            snapshot_retention_days: default_snapshot_retention_days(),
            alert_dedup: AlertDedupPolicy::default(),
            restart_alert_threshold: default_restart_alert_threshold(),
            check_memory_anomalies: false,
            skip_namespace_prefixes: default_skip_namespace_prefixes(),
            kube_context: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("KUBEPOCKET")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("skip_namespace_prefixes"),
            )
            .build()?;

        Self::from_source(source)
    }

    /// Deserialize and validate an already built source
    pub fn from_source(source: config::Config) -> Result<Self> {
        let config: EngineConfig = source
            .try_deserialize()
            .context("invalid engine configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection_interval_secs == 0 {
            bail!("collection_interval_secs must be greater than zero");
        }
        if self.stats_interval_secs == 0 {
            bail!("stats_interval_secs must be greater than zero");
        }
        if self.baseline_window_days == 0 {
            bail!("baseline_window_days must be greater than zero");
        }
        Ok(())
    }

    pub fn collection_config(&self) -> CollectionConfig {
        CollectionConfig {
            interval: Duration::from_secs(self.collection_interval_secs),
            retry_backoff: Duration::from_secs(self.retry_backoff_secs),
            restart_alert_threshold: self.restart_alert_threshold,
            dedup: self.alert_dedup,
        }
    }

    pub fn baseline_config(&self) -> BaselineConfig {
        BaselineConfig {
            window: days(self.baseline_window_days),
            ..BaselineConfig::default()
        }
    }

    pub fn anomaly_config(&self) -> AnomalyConfig {
        AnomalyConfig {
            check_memory: self.check_memory_anomalies,
            dedup: self.alert_dedup,
            ..AnomalyConfig::default()
        }
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            forecast_horizon: days(self.forecast_horizon_days),
            ..AnalysisConfig::default()
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    /// `None` when retention is disabled
    pub fn snapshot_retention(&self) -> Option<Duration> {
        (self.snapshot_retention_days > 0).then(|| days(self.snapshot_retention_days))
    }
}

fn days(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(SECS_PER_DAY))
}
