//! Middleware behavior through the configured global stack.

use std::io::Read;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use flate2::read::GzDecoder;

use switchyard::config::ServerConfig;
use switchyard::http::{handler, X_REQUEST_ID};
use switchyard::lifecycle::build_router;
use switchyard::Router;

mod common;

use common::{body_bytes, body_text, request, user_routes};

fn stack(config: &ServerConfig) -> Router {
    let mut router = build_router(config).unwrap().router;
    user_routes(&mut router);
    router.get("/panic", [handler(|_ctx| {
        Box::pin(async move {
            panic!("handler exploded");
        })
    })]);
    router.get("/slow", [handler(|ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ctx.string(StatusCode::OK, "too late");
        })
    })]);
    router.get("/stream-then-stall", [handler(|ctx| {
        Box::pin(async move {
            ctx.string(StatusCode::OK, "first chunk");
            tokio::time::sleep(Duration::from_secs(5)).await;
            ctx.write(b" never");
        })
    })]);
    router
}

#[tokio::test]
async fn test_panic_is_recovered_with_headers_intact() {
    let router = stack(&ServerConfig::default());

    let response = router.dispatch(request(Method::GET, "/panic"), None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key(X_REQUEST_ID));
    assert_eq!(
        body_text(response).await,
        r#"{"error":"Internal Server Error"}"#
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_before_write_is_504() {
    let mut config = ServerConfig::default();
    config.timeouts.request_secs = 1;
    let router = stack(&config);

    let response = router.dispatch(request(Method::GET, "/slow"), None).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_text(response).await, r#"{"error":"timeout"}"#);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_after_write_keeps_partial_response() {
    let mut config = ServerConfig::default();
    config.timeouts.request_secs = 1;
    let router = stack(&config);

    let response = router
        .dispatch(request(Method::GET, "/stream-then-stall"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "first chunk");
}

#[tokio::test]
async fn test_gzip_round_trip() {
    let router = stack(&ServerConfig::default());
    let request = Request::builder()
        .uri("/users/42")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();

    let response = router.dispatch(request, None).await;
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");

    let compressed = body_bytes(response).await;
    let mut plain = String::new();
    GzDecoder::new(&compressed[..]).read_to_string(&mut plain).unwrap();
    assert_eq!(plain, r#"{"id":"42"}"#);
}

#[tokio::test(start_paused = true)]
async fn test_gzip_applies_to_timeout_response() {
    let mut config = ServerConfig::default();
    config.timeouts.request_secs = 1;
    let router = stack(&config);
    let request = Request::builder()
        .uri("/slow")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();

    let response = router.dispatch(request, None).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    let compressed = body_bytes(response).await;
    let mut plain = String::new();
    GzDecoder::new(&compressed[..]).read_to_string(&mut plain).unwrap();
    assert_eq!(plain, r#"{"error":"timeout"}"#);
}

#[tokio::test]
async fn test_body_limit_from_config() {
    let mut config = ServerConfig::default();
    config.security.max_body_bytes = 8;
    let router = stack(&config);

    let small = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .body(Body::from("tiny"))
        .unwrap();
    let response = router.dispatch(small, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "tiny");

    let large = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .body(Body::from("this body is far too long"))
        .unwrap();
    let response = router.dispatch(large, None).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_cors_preflight_and_rejection() {
    let mut config = ServerConfig::default();
    config.cors.enabled = true;
    config.cors.options.allowed_origins = vec!["*.example.com".into()];
    config.cors.options.allowed_methods = vec!["GET".into()];
    let router = stack(&config);

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/users/1")
        .header(header::ORIGIN, "https://app.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let response = router.dispatch(preflight, None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.example.com"
    );
    assert_eq!(response.headers()[header::ACCESS_CONTROL_MAX_AGE], "86400");

    let foreign = Request::builder()
        .uri("/users/1")
        .header(header::ORIGIN, "https://example.org")
        .body(Body::empty())
        .unwrap();
    let response = router.dispatch(foreign, None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, r#"{"error":"CORS origin not allowed"}"#);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_window() {
    let mut config = ServerConfig::default();
    config.rate_limit.enabled = true;
    config.rate_limit.max_requests = 3;
    config.rate_limit.window_secs = 1;
    let router = stack(&config);

    let from_client = || {
        Request::builder()
            .uri("/users/1")
            .header("x-real-ip", "198.51.100.20")
            .body(Body::empty())
            .unwrap()
    };

    let mut statuses = Vec::new();
    for _ in 0..4 {
        statuses.push(router.dispatch(from_client(), None).await.status());
    }
    assert_eq!(
        statuses,
        vec![
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );

    let rejected = router.dispatch(from_client(), None).await;
    assert_eq!(body_text(rejected).await, r#"{"error":"rate limit exceeded"}"#);

    tokio::time::advance(Duration::from_millis(1100)).await;
    assert_eq!(router.dispatch(from_client(), None).await.status(), StatusCode::OK);
}
