//! Server-level tests over real sockets.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use switchyard::config::ServerConfig;
use switchyard::http::X_REQUEST_ID;
use switchyard::lifecycle::build_router;
use switchyard::{HttpServer, Router};

mod common;

use common::{body_text, spawn_server, user_routes};

fn app() -> Router {
    let mut router = build_router(&ServerConfig::default()).unwrap().router;
    user_routes(&mut router);
    router
}

#[tokio::test]
async fn test_get_user_over_http() {
    let server = spawn_server(app()).await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/users/42")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], "42");

    let response = client.get(server.url("/users")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "route not found");

    server.stop().await;
}

#[tokio::test]
async fn test_post_body_over_http() {
    let server = spawn_server(app()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/echo"))
        .body("ping")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ping");

    server.stop().await;
}

#[tokio::test]
async fn test_request_ids_differ_between_requests() {
    let server = spawn_server(app()).await;
    let client = reqwest::Client::new();

    let first = client.get(server.url("/users/1")).send().await.unwrap();
    let second = client.get(server.url("/users/1")).send().await.unwrap();
    assert_ne!(
        first.headers()["x-request-id"],
        second.headers()["x-request-id"]
    );

    server.stop().await;
}

#[tokio::test]
async fn test_host_router_oneshot() {
    let app = HttpServer::new(app()).host_router();
    let request = Request::builder().uri("/users/9").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(X_REQUEST_ID));
    assert_eq!(body_text(response).await, r#"{"id":"9"}"#);
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let server = spawn_server(app()).await;
    let addr = server.addr;
    server.stop().await;

    let result = reqwest::Client::new()
        .get(format!("http://{addr}/users/1"))
        .send()
        .await;
    assert!(result.is_err());
}
