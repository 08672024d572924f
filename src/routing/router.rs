//! Route table and request dispatch.
//!
//! # Responsibilities
//! - Store compiled routes per HTTP method
//! - Look up the first matching route for a request
//! - Build the per-request context and run global + route handlers
//! - Fall back to a configurable not-found handler
//!
//! # Design Decisions
//! - Routes are compiled at registration and never mutated afterwards
//! - O(n) scan per method (acceptable for typical route counts)
//! - First registered match wins; a literal route does not outrank a
//!   parameter route registered before it
//! - Explicit no-match rather than silent default

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Request};
use axum::response::Response;

use crate::http::chain::{handler, HandlerFn};
use crate::http::context::Context;
use crate::http::response::HttpError;
use crate::routing::group::Group;
use crate::routing::matcher::{
    decode_segment, match_segments, parse_pattern, split_path, Params, Segment,
};

/// A registered pattern and its handlers for one method.
pub struct RouteEntry {
    pattern: String,
    segments: Vec<Segment>,
    handlers: Vec<HandlerFn>,
}

impl RouteEntry {
    fn new(pattern: &str, handlers: Vec<HandlerFn>) -> Self {
        Self {
            pattern: pattern.to_string(),
            segments: parse_pattern(pattern),
            handlers,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn handlers(&self) -> &[HandlerFn] {
        &self.handlers
    }
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("pattern", &self.pattern)
            .field("segments", &self.segments)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub entry: &'a RouteEntry,
    pub params: Params,
}

/// Registered routes, keyed by method, in registration order.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<Method, Vec<RouteEntry>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Duplicates and overlaps are accepted; lookup order decides.
    pub fn register(&mut self, method: Method, pattern: &str, handlers: Vec<HandlerFn>) {
        self.routes
            .entry(method)
            .or_default()
            .push(RouteEntry::new(pattern, handlers));
    }

    /// First entry for `method` that structurally matches `path`.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let entries = self.routes.get(method)?;
        let decoded: Vec<_> = split_path(path).into_iter().map(decode_segment).collect();
        let request: Vec<&str> = decoded.iter().map(|segment| &**segment).collect();

        entries.iter().find_map(|entry| {
            match_segments(&entry.segments, &request).map(|params| RouteMatch { entry, params })
        })
    }

    /// Number of routes registered for `method`.
    pub fn len(&self, method: &Method) -> usize {
        self.routes.get(method).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.values().all(Vec::is_empty)
    }
}

fn default_not_found() -> HandlerFn {
    handler(|ctx| {
        Box::pin(async move {
            ctx.abort_with_error(&HttpError::not_found("route not found"));
        })
    })
}

/// The dispatcher: route table, global middleware and the not-found fallback.
pub struct Router {
    table: RouteTable,
    global: Vec<HandlerFn>,
    not_found: HandlerFn,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            table: RouteTable::new(),
            global: Vec::new(),
            not_found: default_not_found(),
        }
    }

    // ---------------------------
    // Middleware registration
    // ---------------------------

    /// Append global middleware. It runs before route handlers, in the order added.
    pub fn use_middleware(&mut self, middleware: impl IntoIterator<Item = HandlerFn>) -> &mut Self {
        self.global.extend(middleware);
        self
    }

    /// Replace the handler that runs (after global middleware) when no route matches.
    pub fn set_not_found(&mut self, handler: HandlerFn) -> &mut Self {
        self.not_found = handler;
        self
    }

    // ---------------------------
    // Route registration
    // ---------------------------

    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handlers: impl IntoIterator<Item = HandlerFn>,
    ) -> &mut Self {
        let handlers: Vec<HandlerFn> = handlers.into_iter().collect();
        tracing::debug!(method = %method, pattern, handlers = handlers.len(), "Route registered");
        self.table.register(method, pattern, handlers);
        self
    }

    pub fn get(&mut self, pattern: &str, handlers: impl IntoIterator<Item = HandlerFn>) -> &mut Self {
        self.route(Method::GET, pattern, handlers)
    }

    pub fn post(&mut self, pattern: &str, handlers: impl IntoIterator<Item = HandlerFn>) -> &mut Self {
        self.route(Method::POST, pattern, handlers)
    }

    pub fn put(&mut self, pattern: &str, handlers: impl IntoIterator<Item = HandlerFn>) -> &mut Self {
        self.route(Method::PUT, pattern, handlers)
    }

    pub fn delete(&mut self, pattern: &str, handlers: impl IntoIterator<Item = HandlerFn>) -> &mut Self {
        self.route(Method::DELETE, pattern, handlers)
    }

    /// Register routes under a shared path prefix.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group::new(self, prefix)
    }

    /// Apply a batch of registrations, e.g. one per feature module.
    pub fn use_routes(&mut self, routes: impl IntoIterator<Item = fn(&mut Router)>) -> &mut Self {
        for register in routes {
            register(self);
        }
        self
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    // ---------------------------
    // Dispatch
    // ---------------------------

    /// Run one request through the engine and commit its response.
    ///
    /// `remote_addr` falls back to axum's `ConnectInfo` extension when absent.
    pub async fn dispatch(&self, request: Request<Body>, remote_addr: Option<SocketAddr>) -> Response {
        let remote_addr = remote_addr.or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0)
        });

        let mut ctx = Context::new(request, remote_addr);
        let mut handlers = self.global.clone();

        match self.table.lookup(ctx.method(), ctx.path()) {
            Some(found) => {
                handlers.extend(found.entry.handlers.iter().cloned());
                ctx.bind_route(&found.entry.pattern, found.params);
            }
            None => {
                tracing::debug!(method = %ctx.method(), path = %ctx.path(), "No route matched");
                handlers.push(self.not_found.clone());
            }
        }

        ctx.set_handlers(handlers);
        ctx.next().await;
        ctx.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;

    fn tagged(tag: &'static str) -> HandlerFn {
        handler(move |ctx| {
            Box::pin(async move {
                ctx.string(StatusCode::OK, tag);
            })
        })
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_lookup_first_registered_wins() {
        let mut table = RouteTable::new();
        table.register(Method::GET, "/users/:id", vec![tagged("param")]);
        table.register(Method::GET, "/users/me", vec![tagged("literal")]);

        let found = table.lookup(&Method::GET, "/users/me").unwrap();
        assert_eq!(found.entry.pattern(), "/users/:id");
        assert_eq!(found.params.get("id").map(String::as_str), Some("me"));
    }

    #[test]
    fn test_lookup_misses() {
        let mut table = RouteTable::new();
        table.register(Method::GET, "/users/:id", vec![]);

        assert!(table.lookup(&Method::POST, "/users/1").is_none());
        assert!(table.lookup(&Method::GET, "/users").is_none());
        assert!(table.lookup(&Method::GET, "/accounts/1").is_none());
        assert_eq!(table.len(&Method::GET), 1);
        assert_eq!(table.len(&Method::DELETE), 0);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut table = RouteTable::new();
        table.register(Method::GET, "/a", vec![]);
        table.register(Method::GET, "/a", vec![]);
        assert_eq!(table.len(&Method::GET), 2);
        assert!(!table.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_order_determinism() {
        let mut router = Router::new();
        router.get("/files/:name", [tagged("first")]);
        router.get("/files/:other", [tagged("second")]);

        let response = router.dispatch(request(Method::GET, "/files/readme"), None).await;
        assert_eq!(body_text(response).await, "first");
    }

    #[tokio::test]
    async fn test_dispatch_not_found_runs_global_middleware() {
        let mut router = Router::new();
        router.use_middleware([handler(|ctx| {
            Box::pin(async move {
                ctx.set_header(
                    axum::http::HeaderName::from_static("x-seen"),
                    axum::http::HeaderValue::from_static("1"),
                );
                ctx.next().await;
            })
        })]);

        let response = router.dispatch(request(Method::GET, "/nowhere"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-seen"], "1");
        assert_eq!(body_text(response).await, r#"{"error":"route not found"}"#);
    }

    #[tokio::test]
    async fn test_custom_not_found() {
        let mut router = Router::new();
        router.set_not_found(handler(|ctx| {
            Box::pin(async move {
                ctx.string(StatusCode::NOT_FOUND, "nothing here");
            })
        }));

        let response = router.dispatch(request(Method::GET, "/x"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "nothing here");
    }

    #[tokio::test]
    async fn test_route_handlers_run_after_global() {
        let mut router = Router::new();
        router.use_middleware([handler(|ctx| {
            Box::pin(async move {
                ctx.set("order", vec!["global"]);
            })
        })]);
        router.post("/items", [handler(|ctx| {
            Box::pin(async move {
                let seen = ctx.get::<Vec<&'static str>>("order").cloned().unwrap_or_default();
                ctx.json(StatusCode::CREATED, &seen);
            })
        })]);

        let response = router.dispatch(request(Method::POST, "/items"), None).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_text(response).await, r#"["global"]"#);
    }
}
