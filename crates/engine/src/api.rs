//! HTTP API for health checks, Prometheus metrics and derived results

use crate::exporter::Exporter;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use engine_lib::{
    health::{ComponentStatus, HealthRegistry},
    AnalysisContext, EngineError, MetricType, StoreError,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_FORECAST_DAYS: usize = 7;
const MAX_FORECAST_DAYS: usize = 90;
const DEFAULT_TREND_DAYS: u32 = 7;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub analysis: AnalysisContext,
    pub exporter: Exporter,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, analysis: AnalysisContext, cluster: &str) -> Self {
        let exporter = Exporter::new(analysis.clone(), cluster).with_health(health_registry.clone());
        Self {
            health_registry,
            analysis,
            exporter,
        }
    }
}

/// Error returned by API handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Engine(EngineError::Persistence(StoreError::NotFound { .. })) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ApiError::Engine(EngineError::Persistence(StoreError::Unavailable(_))) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            ApiError::Engine(e) => {
                error!(error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.exporter.render().await {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn relative_cost(
    State(state): State<Arc<AppState>>,
) -> ApiResult<engine_lib::cost::RelativeCost> {
    Ok(Json(state.analysis.relative_cost().await?))
}

async fn waste(State(state): State<Arc<AppState>>) -> ApiResult<engine_lib::cost::WasteReport> {
    Ok(Json(state.analysis.waste().await?))
}

async fn cost_summary(
    State(state): State<Arc<AppState>>,
) -> ApiResult<engine_lib::analysis::CostSummary> {
    Ok(Json(state.analysis.cost_summary().await?))
}

async fn cluster_summary(
    State(state): State<Arc<AppState>>,
) -> ApiResult<engine_lib::ClusterSummary> {
    Ok(Json(state.analysis.cluster_summary().await?))
}

async fn namespace_metrics(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<engine_lib::analysis::NamespaceMetrics>> {
    Ok(Json(state.analysis.namespace_metrics().await?))
}

#[derive(Debug, Deserialize)]
struct TrendQuery {
    days: Option<u32>,
}

async fn trend(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendQuery>,
) -> ApiResult<engine_lib::analysis::DailyTrend> {
    let days = query.days.unwrap_or(DEFAULT_TREND_DAYS);
    Ok(Json(state.analysis.daily_trend(days, Utc::now()).await?))
}

async fn anomalies(
    State(state): State<Arc<AppState>>,
) -> ApiResult<engine_lib::analysis::AnomalyReport> {
    Ok(Json(state.analysis.anomaly_scores().await?))
}

#[derive(Debug, Deserialize)]
struct ForecastQuery {
    metric: Option<String>,
    days: Option<usize>,
}

async fn forecast(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    Query(query): Query<ForecastQuery>,
) -> ApiResult<engine_lib::anomaly::DailyForecast> {
    let metric = match query.metric.as_deref() {
        Some(raw) => raw.parse::<MetricType>().map_err(ApiError::BadRequest)?,
        None => MetricType::Cpu,
    };
    let days = query.days.unwrap_or(DEFAULT_FORECAST_DAYS);
    if days == 0 || days > MAX_FORECAST_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_FORECAST_DAYS
        )));
    }

    state
        .analysis
        .forecast_daily(&namespace, metric, days, Utc::now())
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!("not enough history to forecast {}", namespace))
        })
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    active_only: Option<bool>,
}

async fn alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> ApiResult<Vec<engine_lib::Alert>> {
    let active_only = query.active_only.unwrap_or(true);
    let alerts = state
        .analysis
        .repository()
        .alerts(active_only)
        .await
        .map_err(EngineError::from)?;
    Ok(Json(alerts))
}

async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<engine_lib::Alert> {
    let alert = state
        .analysis
        .repository()
        .resolve_alert(id)
        .await
        .map_err(EngineError::from)?;
    info!(event = "alert_resolved", alert_id = id, namespace = %alert.namespace, "Alert resolved");
    Ok(Json(alert))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/cost/relative", get(relative_cost))
        .route("/api/v1/cost/waste", get(waste))
        .route("/api/v1/cost/summary", get(cost_summary))
        .route("/api/v1/metrics/summary", get(cluster_summary))
        .route("/api/v1/metrics/namespaces", get(namespace_metrics))
        .route("/api/v1/metrics/trend", get(trend))
        .route("/api/v1/anomalies", get(anomalies))
        .route("/api/v1/forecast/:namespace", get(forecast))
        .route("/api/v1/alerts", get(alerts))
        .route("/api/v1/alerts/:id/resolve", post(resolve_alert))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
