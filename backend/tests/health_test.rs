//! Integration tests for health check endpoints

mod common;

use axum::http::StatusCode;

#[tokio::test]
async fn test_health_endpoint() {
    let app = common::TestApp::new().await;

    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("healthy"));
}

#[tokio::test]
async fn test_liveness_endpoint() {
    let app = common::TestApp::new().await;

    let (status, body) = app.get("/health/live").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("alive"));
}

#[tokio::test]
async fn test_metrics_without_recorder_is_not_found() {
    let app = common::TestApp::new().await;

    let (status, _) = app.get("/metrics").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_readiness_endpoint() {
    let app = common::TestApp::new().await;

    let (status, body) = app.get("/health/ready").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("ready"));
    assert!(body.contains("\"profile_cache\""));
}
