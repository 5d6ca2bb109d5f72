use affiliate_ledger::api::{self, AppState};
use affiliate_ledger::config::Config;
use affiliate_ledger::datasource::MockPurchaseSource;
use affiliate_ledger::db::init_db;
use affiliate_ledger::Repository;
use axum::http::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

async fn setup_test_app() -> (axum::Router, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let env: HashMap<String, String> = [
        ("DATABASE_PATH", db_path.as_str()),
        ("PURCHASE_API_URL", "http://example.invalid"),
        ("MAX_UPLINE_DEPTH", "2"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let config = Config::from_env_map(env).expect("config");

    let state = AppState::new(repo, &config, Arc::new(MockPurchaseSource::new()));
    (api::create_router(state), temp_dir)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _temp) = setup_test_app().await;
    let (status, json) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_ready_endpoint_reports_configured_depth() {
    let (app, _temp) = setup_test_app().await;
    let (status, json) = get(app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ready");
    assert_eq!(json["commissionLevels"], 2);
}

#[tokio::test]
async fn test_unknown_affiliate_returns_json_error() {
    let (app, _temp) = setup_test_app().await;
    let (status, json) = get(app, "/v1/affiliates/nobody/balance").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("nobody"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _temp) = setup_test_app().await;
    let (status, _) = get(app, "/v1/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
