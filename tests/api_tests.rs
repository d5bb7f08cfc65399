//! HTTP routes of the server

use analytics_mcp_server::{api::create_api_router, config::Config, AppState};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use mockito::Server;
use serde_json::{json, Value};
use tower::ServiceExt;

fn create_test_app(config: Config) -> Router {
    let state = AppState::new(config, None).unwrap();
    Router::new().nest("/api", create_api_router()).with_state(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_reports_disabled_pool() {
    let app = create_test_app(Config::default());

    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["proxy_pool"]["enabled"], false);
}

#[tokio::test]
async fn test_dashboard_route_rejects_unsupported_url() {
    let app = create_test_app(Config::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/dashboard?url=https%3A%2F%2Fexample.com%2Fdash")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "unsupported_url");
}

#[tokio::test]
async fn test_dashboard_route_returns_footprint_charts() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/v1/dashboard/basic")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"data": {"uuid": "u-7"}}).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/data")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"results": [{"card_id": 7}]}).to_string())
        .create_async()
        .await;
    let mut config = Config::default();
    config.footprint_api_base = format!("{}/api/v1", server.url());
    config.footprint_data_api_url = format!("{}/data", server.url());
    let app = create_test_app(config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/dashboard?url=https%3A%2F%2Fwww.footprint.network%2F%40Higi%2FSui-Bridge")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"charts": [{"card_id": 7}]}));
}

#[tokio::test]
async fn test_rpc_tools_list() {
    let app = create_test_app(Config::default());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/rpc")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"]["tools"][0]["name"], "get_dashboard_data");
}
