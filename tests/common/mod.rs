//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use switchyard::http::handler;
use switchyard::{HttpServer, Router, Shutdown};

/// A running server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to drain.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.task.await.unwrap().unwrap();
    }
}

/// Serve `router` on `127.0.0.1:0`.
pub async fn spawn_server(router: Router) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(HttpServer::new(router).run(listener, shutdown.subscribe()));
    TestServer {
        addr,
        shutdown,
        task,
    }
}

/// `GET /users/:id` echoing the id, plus `POST /echo` returning the body.
pub fn user_routes(router: &mut Router) {
    router.get("/users/:id", [handler(|ctx| {
        Box::pin(async move {
            let id = ctx.param("id").unwrap_or_default().to_string();
            ctx.json(StatusCode::OK, &serde_json::json!({ "id": id }));
        })
    })]);
    router.post("/echo", [handler(|ctx| {
        Box::pin(async move {
            match ctx.body_bytes().await {
                Ok(body) => {
                    ctx.status(StatusCode::OK);
                    ctx.write(&body);
                }
                Err(e) if e.is_body_too_large() => {
                    ctx.abort_with_error(&switchyard::HttpError::payload_too_large(e.to_string()));
                }
                Err(e) => ctx.abort_with_error(&switchyard::HttpError::bad_request(e.to_string())),
            }
        })
    })]);
}

pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
