//! Integration tests for the engine API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use engine_lib::{
    health::{components, HealthRegistry},
    store::{InMemoryRepository, Repository},
    AlertKind, AlertSeverity, AnalysisConfig, AnalysisContext, NamespaceSnapshot, NewAlert,
    PodRecord, PodStatus,
};
use kubepocket_engine::api::{create_router, AppState};
use std::sync::Arc;
use tower::ServiceExt;

fn pod(namespace: &str, name: &str, status: PodStatus, cpu: f64, memory: f64) -> PodRecord {
    PodRecord {
        name: name.to_string(),
        namespace: namespace.to_string(),
        status,
        restart_count: 0,
        cpu_request: cpu,
        memory_request: memory,
        cpu_limit: 0.0,
        memory_limit: 0.0,
        age_hours: 12.0,
        node_name: None,
    }
}

async fn setup_test_app() -> (Router, Arc<InMemoryRepository>, HealthRegistry) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::COLLECTOR).await;
    health_registry.register(components::BASELINE).await;
    health_registry.set_ready(true).await;

    let repository = Arc::new(InMemoryRepository::new());
    let analysis = AnalysisContext::new(repository.clone(), AnalysisConfig::default());
    let state = Arc::new(AppState::new(health_registry.clone(), analysis, "test"));

    (create_router(state), repository, health_registry)
}

async fn seed_cluster(repository: &InMemoryRepository) {
    let now = Utc::now();
    repository
        .insert_snapshots(vec![
            NamespaceSnapshot::from_pods(
                "shop",
                now,
                vec![
                    pod("shop", "web", PodStatus::Running, 3.0, 3.0),
                    pod("shop", "stuck-job", PodStatus::Pending, 1.0, 1.0),
                ],
            ),
            NamespaceSnapshot::from_pods(
                "blog",
                now,
                vec![pod("blog", "app", PodStatus::Running, 1.0, 1.0)],
            ),
        ])
        .await
        .unwrap();
}

async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _repo, _health) = setup_test_app().await;

    let (status, health) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, _repo, health) = setup_test_app().await;
    health
        .set_unhealthy(components::COLLECTOR, "API server unreachable")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _repo, health) = setup_test_app().await;
    health.set_ready(false).await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn test_relative_cost_is_empty_object_without_snapshots() {
    let (app, _repo, _health) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/cost/relative").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({}));
}

#[tokio::test]
async fn test_relative_cost_sorted_by_share() {
    let (app, repo, _health) = setup_test_app().await;
    seed_cluster(&repo).await;

    let (status, body) = get(app, "/api/v1/cost/relative").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cluster_total_cpu"], 5.0);
    assert_eq!(body["namespaces"][0]["namespace"], "shop");
    assert_eq!(body["namespaces"][0]["cost_pct"], 80.0);
}

#[tokio::test]
async fn test_waste_flags_idle_pod() {
    let (app, repo, _health) = setup_test_app().await;
    seed_cluster(&repo).await;

    let (status, body) = get(app, "/api/v1/cost/waste").await;
    assert_eq!(status, StatusCode::OK);

    let pods = body["waste_pods"].as_array().unwrap();
    assert!(pods
        .iter()
        .any(|p| p["pod"] == "stuck-job" && p["reasons"][0]["type"] == "idle_pod"));
    let stuck = pods.iter().find(|p| p["pod"] == "stuck-job").unwrap();
    assert_eq!(stuck["memory_request"], 1.0);
    assert_eq!(body["summary"]["total_pods_analyzed"], 3);
}

#[tokio::test]
async fn test_cost_summary_combines_both_reports() {
    let (app, repo, _health) = setup_test_app().await;
    seed_cluster(&repo).await;

    let (status, body) = get(app, "/api/v1/cost/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["relative_cost"]["namespaces"].is_array());
    assert!(body["waste"]["summary"].is_object());
}

#[tokio::test]
async fn test_metrics_summary_counts_pods() {
    let (app, repo, _health) = setup_test_app().await;
    seed_cluster(&repo).await;

    let (status, body) = get(app, "/api/v1/metrics/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_namespaces"], 2);
    assert_eq!(body["total_pods"], 3);
    assert_eq!(body["running_pods"], 2);
    assert_eq!(body["active_alerts"], 0);
}

#[tokio::test]
async fn test_forecast_without_history_is_404() {
    let (app, repo, _health) = setup_test_app().await;
    seed_cluster(&repo).await;

    let (status, body) = get(app, "/api/v1/forecast/shop").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("shop"));
}

#[tokio::test]
async fn test_forecast_rejects_unknown_metric() {
    let (app, _repo, _health) = setup_test_app().await;

    let (status, _body) = get(app, "/api/v1/forecast/shop?metric=disk").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_forecast_with_daily_history() {
    let (app, repo, _health) = setup_test_app().await;
    let now = Utc::now();
    let history = (1..=6)
        .map(|day| {
            NamespaceSnapshot::from_pods(
                "shop",
                now - Duration::days(7 - day),
                vec![pod("shop", "web", PodStatus::Running, day as f64, 1.0)],
            )
        })
        .collect();
    repo.insert_snapshots(history).await.unwrap();

    let (status, body) = get(app, "/api/v1/forecast/shop?metric=cpu&days=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["namespace"], "shop");
    assert_eq!(body["forecast_values"].as_array().unwrap().len(), 3);
    assert!(body["trend"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_alert_listing_and_resolution() {
    let (app, repo, _health) = setup_test_app().await;
    let stored = repo
        .insert_alerts(vec![NewAlert {
            namespace: "shop".to_string(),
            kind: AlertKind::Restart,
            metric_type: None,
            pod: Some("web".to_string()),
            severity: AlertSeverity::Warning,
            message: "Pod web restarted 7 times".to_string(),
            created_at: Utc::now(),
        }])
        .await
        .unwrap();
    let id = stored[0].id;

    let (status, body) = get(app.clone(), "/api/v1/alerts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/alerts/{}/resolve", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, active) = get(app.clone(), "/api/v1/alerts").await;
    assert!(active.as_array().unwrap().is_empty());

    let (_, all) = get(app, "/api/v1/alerts?active_only=false").await;
    assert_eq!(all[0]["resolved"], true);
}

#[tokio::test]
async fn test_resolving_unknown_alert_is_404() {
    let (app, _repo, _health) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/alerts/999/resolve")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint_exports_gauges() {
    let (app, repo, _health) = setup_test_app().await;
    seed_cluster(&repo).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("kubepocket_up{cluster=\"test\"} 1"));
    assert!(text.contains("kubepocket_namespace_cost_pct"));
    assert!(text.contains("kubepocket_pod_waste_score"));
}
