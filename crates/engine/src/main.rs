//! KubePocket engine - Kubernetes resource signal engine
//!
//! Collects namespace snapshots on an interval, recomputes baselines and
//! alerts on a slower schedule, and serves cost, waste, anomaly and
//! forecast results over HTTP.

use anyhow::Result;
use engine_lib::{
    anomaly::AnomalyDetector,
    baseline::{BaselineRecomputer, BaselineScheduler},
    collector::CollectionLoopBuilder,
    health::{components, HealthRegistry},
    observability::{EngineMetrics, StructuredLogger},
    store::{InMemoryRepository, Repository},
    AnalysisContext,
};
use kubepocket_engine::{api, config::EngineConfig, platform::KubeSource};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting kubepocket-engine");

    // Load configuration
    let config = EngineConfig::load()?;
    info!(
        cluster = %config.cluster_name,
        collection_interval_secs = config.collection_interval_secs,
        stats_interval_secs = config.stats_interval_secs,
        alert_dedup = ?config.alert_dedup,
        "Engine configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::COLLECTOR).await;
    health_registry.register(components::BASELINE).await;
    health_registry.register(components::STORE).await;
    health_registry.register(components::EXPORTER).await;

    // Register engine metrics before the first scrape
    let _metrics = EngineMetrics::new();

    let logger = StructuredLogger::new(&config.cluster_name);
    logger.log_startup(ENGINE_VERSION);

    let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());

    let source = KubeSource::connect(
        config.kube_context.as_deref(),
        config.skip_namespace_prefixes.clone(),
    )
    .await?;

    let collection_config = config.collection_config();
    let collection_loop = CollectionLoopBuilder::new()
        .source(Arc::new(source))
        .repository(repository.clone())
        .interval(collection_config.interval)
        .retry_backoff(collection_config.retry_backoff)
        .restart_alert_threshold(collection_config.restart_alert_threshold)
        .dedup(collection_config.dedup)
        .logger(logger.clone())
        .health(health_registry.clone())
        .build()?;

    let recomputer = Arc::new(BaselineRecomputer::new(
        repository.clone(),
        config.baseline_config(),
    ));
    let detector = Arc::new(AnomalyDetector::new(
        repository.clone(),
        config.anomaly_config(),
    ));
    let mut scheduler = BaselineScheduler::new(recomputer, detector)
        .with_interval(config.stats_interval())
        .with_retry_backoff(config.retry_backoff())
        .with_logger(logger.clone())
        .with_health(health_registry.clone());
    if let Some(keep) = config.snapshot_retention() {
        scheduler = scheduler.with_retention(repository.clone(), keep);
    }
    let scheduler = Arc::new(scheduler);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let collection_handle = tokio::spawn(collection_loop.run(shutdown_tx.subscribe()));
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    // Create shared application state
    let analysis = AnalysisContext::new(repository, config.analysis_config());
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        analysis,
        &config.cluster_name,
    ));

    // Mark engine as ready after initialization
    health_registry.set_ready(true).await;

    // Start API server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    for handle in [collection_handle, scheduler_handle] {
        if let Err(e) = handle.await {
            error!(error = %e, "Background task panicked");
        }
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
