use std::path::Path as FsPath;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use clusterscope_config::{EngineConfig, HealthConfig, MetricsConfig};
use clusterscope_core::KubeconfigSources;
use http_body_util::BodyExt;
use tower::ServiceExt;

use super::*;

const KUBECONFIG: &str = "apiVersion: v1
kind: Config
clusters:
- name: alpha-cluster
  cluster:
    server: http://127.0.0.1:1
contexts:
- name: alpha
  context:
    cluster: alpha-cluster
    user: tester
users:
- name: tester
  user:
    token: test-token
";

async fn manager_with_home(home: &FsPath) -> SharedManager {
    let mut config = EngineConfig::default();
    config.metrics = MetricsConfig { interval_ms: 50, ..MetricsConfig::default() };
    config.health = HealthConfig { probe_interval_ms: 50, connect_timeout_ms: 500, probe_timeout_ms: 500, ..HealthConfig::default() };
    let sources = KubeconfigSources::new(None, Some(home.to_path_buf()), vec![]);
    let (manager, _) = ClusterManager::load(config, sources).await.unwrap();
    Arc::new(manager)
}

async fn get_json(manager: &SharedManager, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router(Arc::clone(manager))
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn contexts_listing_is_empty_without_kubeconfigs() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager_with_home(home.path()).await;

    let (status, json) = get_json(&manager, "/api/contexts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn contexts_listing_includes_offline_clusters() {
    let home = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(home.path().join(".kube")).unwrap();
    std::fs::write(home.path().join(".kube").join("config"), KUBECONFIG).unwrap();
    let manager = manager_with_home(home.path()).await;

    let (status, json) = get_json(&manager, "/api/contexts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["name"], "alpha");
    assert_eq!(json[0]["reachable"], false);
    assert_eq!(json[0]["server"], "http://127.0.0.1:1");

    let (status, health) = get_json(&manager, "/api/contexts/alpha/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(health["status"], "CONNECTED");
    assert!(health["last_error"].is_string());

    manager.shutdown().await;
}

#[tokio::test]
async fn unknown_context_health_is_not_found() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager_with_home(home.path()).await;

    let (status, _) = get_json(&manager, "/api/contexts/ghost/health").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn refresh_after_shutdown_is_unavailable() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager_with_home(home.path()).await;

    let response = router(Arc::clone(&manager))
        .oneshot(Request::builder().method("POST").uri("/api/refresh").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    manager.shutdown().await;
    let response = tokio::time::timeout(
        Duration::from_secs(5),
        router(Arc::clone(&manager))
            .oneshot(Request::builder().method("POST").uri("/api/refresh").body(Body::empty()).unwrap()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
