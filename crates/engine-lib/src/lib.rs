//! Signal engine for Kubernetes resource snapshots
//!
//! This crate provides the core functionality for:
//! - Snapshot collection and normalization
//! - Namespace baselines, trends and anomaly alerts
//! - Relative cost allocation and pod waste detection
//! - Persistence through the [`store::Repository`] trait
//! - Health checks and observability

pub mod analysis;
pub mod anomaly;
pub mod baseline;
pub mod collector;
pub mod cost;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod snapshot;
pub mod store;

pub use analysis::{AnalysisConfig, AnalysisContext};
pub use error::{EngineError, EngineResult, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use snapshot::{ClusterSummary, SnapshotSet};
