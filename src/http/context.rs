//! Per-request execution context.
//!
//! # Responsibilities
//! - Carry request data (method, path, headers, params, query, body)
//! - Drive the handler chain through the dispatch cursor
//! - Guard response writes (header block once, body after header)
//! - Hold inter-middleware data, accumulated errors, abort latch, deadline
//!
//! # Design Decisions
//! - One context per request, never pooled or shared across requests
//! - Response state sits behind a shared slot so a timed-out chain running
//!   on another task can be cut off from it (see [`Context::fork`])
//! - Query string parsed lazily, once
//! - Body read once into memory; every later read sees the same bytes
//! - `wrote_header` / `wrote_body` are what middleware consult before writing

use std::any::Any;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::Response;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::Error;
use crate::http::chain::{Chain, HandlerFn};
use crate::http::response::{HttpError, ENCODE_FAILURE_BODY};
use crate::http::writer::{BufferedWriter, ResponseWriter};
use crate::routing::Params;

/// Request body, before and after the first read.
enum BodyState {
    Unread(Body),
    Buffered(Bytes),
    Failed(BodyFailure),
}

#[derive(Debug, Clone)]
enum BodyFailure {
    TooLarge { limit: usize },
    Read(String),
    /// A read was dropped before it completed.
    Interrupted,
    /// The body went to a forked chain that never handed it back.
    Detached,
}

impl From<BodyFailure> for Error {
    fn from(failure: BodyFailure) -> Self {
        match failure {
            BodyFailure::TooLarge { limit } => Error::BodyTooLarge { limit },
            BodyFailure::Read(message) => Error::BodyRead(message),
            BodyFailure::Interrupted => Error::BodyRead("body read was interrupted".into()),
            BodyFailure::Detached => {
                Error::BodyRead("body is held by a chain that timed out".into())
            }
        }
    }
}

async fn read_body(body: Body, limit: Option<usize>) -> Result<Bytes, BodyFailure> {
    match limit {
        Some(limit) => match Limited::new(body, limit).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(BodyFailure::TooLarge { limit })
            }
            Err(e) => Err(BodyFailure::Read(e.to_string())),
        },
        None => body
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .map_err(|e| BodyFailure::Read(e.to_string())),
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut values: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            values.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }
    values
}

/// Everything about the response that must survive a timed-out fork.
struct ResponseState {
    status: StatusCode,
    wrote_header: bool,
    wrote_body: bool,
    writer: Box<dyn ResponseWriter>,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            wrote_header: false,
            wrote_body: false,
            writer: Box::new(BufferedWriter::new()),
        }
    }
}

/// Revocable right of a forked context to touch the shared response.
#[derive(Debug, Clone, Default)]
pub(crate) struct Lease(Arc<AtomicBool>);

impl Lease {
    fn is_revoked(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Handle on the response state. Forks share the state and add a lease.
#[derive(Clone, Default)]
struct ResponseSlot {
    state: Arc<Mutex<ResponseState>>,
    leases: Vec<Lease>,
}

impl ResponseSlot {
    fn read<R>(&self, f: impl FnOnce(&ResponseState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Run `f` on the state unless one of our leases was revoked.
    fn write<R>(&self, f: impl FnOnce(&mut ResponseState) -> R) -> Option<R> {
        let mut state = self.state.lock();
        if self.leases.iter().any(Lease::is_revoked) {
            return None;
        }
        Some(f(&mut state))
    }

    /// Revoke under the state lock: once this returns, holders of `lease`
    /// can no longer write.
    fn revoke(&self, lease: &Lease) {
        let _state = self.state.lock();
        lease.0.store(true, Ordering::Release);
    }

    fn take(&self) -> ResponseState {
        std::mem::take(&mut *self.state.lock())
    }
}

/// The mutable state threaded through one request's handler chain.
pub struct Context {
    method: Method,
    uri: Uri,
    request_headers: HeaderMap,
    remote_addr: Option<SocketAddr>,

    route: Option<String>,
    params: Params,
    query: OnceCell<HashMap<String, Vec<String>>>,

    body: BodyState,
    body_limit: Option<usize>,

    keys: HashMap<String, Arc<dyn Any + Send + Sync>>,
    errors: Vec<Error>,

    aborted: bool,
    deadline: Option<Instant>,

    chain: Chain,
    response: ResponseSlot,
}

impl Context {
    /// Build a fresh context for an inbound request.
    pub fn new(request: Request<Body>, remote_addr: Option<SocketAddr>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            request_headers: parts.headers,
            remote_addr,
            route: None,
            params: Params::new(),
            query: OnceCell::new(),
            body: BodyState::Unread(body),
            body_limit: None,
            keys: HashMap::new(),
            errors: Vec::new(),
            aborted: false,
            deadline: None,
            chain: Chain::default(),
            response: ResponseSlot::default(),
        }
    }

    pub(crate) fn bind_route(&mut self, pattern: &str, params: Params) {
        self.route = Some(pattern.to_string());
        self.params = params;
    }

    pub(crate) fn set_handlers(&mut self, handlers: Vec<HandlerFn>) {
        self.chain = Chain::new(handlers);
    }

    // ---------------------------
    // Chain control
    // ---------------------------

    /// Run the rest of the chain.
    ///
    /// Safe to call from the dispatcher and from inside any handler. A nested
    /// call runs every remaining handler before returning; calling it again
    /// once the chain is finished or aborted does nothing.
    pub fn next(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            while let Some(handler) = self.chain.advance(self.aborted) {
                handler.call(self).await;
            }
        })
    }

    /// Stop any further handler from starting. The running handler continues.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Position of the handler currently running, `None` before the chain starts.
    pub fn handler_index(&self) -> Option<usize> {
        self.chain.position()
    }

    /// Number of handlers in this request's chain.
    pub fn handler_count(&self) -> usize {
        self.chain.len()
    }

    /// Move the rest of the chain into an owned context that can run on
    /// another task.
    ///
    /// The fork takes the body and the cursor and shares the response. This
    /// context keeps request data and the store, and advancing it does
    /// nothing until [`rejoin`](Self::rejoin). Revoking the returned lease
    /// through [`retire`](Self::retire) cuts the fork off from the response.
    pub(crate) fn fork(&mut self) -> (Context, Lease) {
        let lease = Lease::default();
        let mut response = self.response.clone();
        response.leases.push(lease.clone());

        let forked = Context {
            method: self.method.clone(),
            uri: self.uri.clone(),
            request_headers: self.request_headers.clone(),
            remote_addr: self.remote_addr,
            route: self.route.clone(),
            params: self.params.clone(),
            query: self.query.clone(),
            body: std::mem::replace(&mut self.body, BodyState::Failed(BodyFailure::Detached)),
            body_limit: self.body_limit,
            keys: self.keys.clone(),
            errors: Vec::new(),
            aborted: self.aborted,
            deadline: self.deadline,
            chain: std::mem::take(&mut self.chain),
            response,
        };
        (forked, lease)
    }

    /// Take back the state of a fork that ran to completion.
    pub(crate) fn rejoin(&mut self, forked: Context) {
        self.body = forked.body;
        self.keys = forked.keys;
        self.errors.extend(forked.errors);
        self.aborted |= forked.aborted;
        self.chain = forked.chain;
        if let Some(query) = forked.query.into_inner() {
            let _ = self.query.set(query);
        }
    }

    /// Cut a fork off from the response. Its later writes are dropped.
    pub(crate) fn retire(&self, lease: &Lease) {
        self.response.revoke(lease);
    }

    // ---------------------------
    // Request data
    // ---------------------------

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The matched route pattern, e.g. `/users/:id`.
    pub fn full_path(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    /// A request header as text. Missing or non-visible-ASCII values yield `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request_headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    fn query_values(&self) -> &HashMap<String, Vec<String>> {
        self.query.get_or_init(|| parse_query(self.uri.query()))
    }

    /// First value of a query parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query_values()
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// First value of a query parameter, or `default` when missing or empty.
    pub fn query_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.query(key) {
            Some(value) if !value.is_empty() => value,
            _ => default,
        }
    }

    /// Every value of a repeated query parameter.
    pub fn query_all(&self, key: &str) -> &[String] {
        self.query_values()
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    // ---------------------------
    // Body
    // ---------------------------

    /// Cap the request body at `max` bytes. The tighter of two ceilings wins.
    ///
    /// Only affects reads that have not happened yet.
    pub fn limit_body(&mut self, max: usize) {
        self.body_limit = Some(self.body_limit.map_or(max, |current| current.min(max)));
    }

    pub fn body_limit(&self) -> Option<usize> {
        self.body_limit
    }

    /// The full request body.
    ///
    /// The first call buffers the body; later calls return the same bytes. A
    /// failed first read is reported again on every later call.
    pub async fn body_bytes(&mut self) -> Result<Bytes, Error> {
        // a read dropped mid-flight leaves the interrupted marker behind
        let taken = std::mem::replace(&mut self.body, BodyState::Failed(BodyFailure::Interrupted));
        let (state, result) = match taken {
            BodyState::Unread(body) => match read_body(body, self.body_limit).await {
                Ok(bytes) => (BodyState::Buffered(bytes.clone()), Ok(bytes)),
                Err(failure) => (BodyState::Failed(failure.clone()), Err(failure.into())),
            },
            BodyState::Buffered(bytes) => (BodyState::Buffered(bytes.clone()), Ok(bytes)),
            BodyState::Failed(failure) => (BodyState::Failed(failure.clone()), Err(failure.into())),
        };
        self.body = state;
        result
    }

    pub async fn body_string(&mut self) -> Result<String, Error> {
        let bytes = self.body_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decode the body as JSON.
    pub async fn bind_json<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let bytes = self.body_bytes().await?;
        serde_json::from_slice(&bytes).map_err(Error::Decode)
    }

    // ---------------------------
    // Inter-middleware store
    // ---------------------------

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.keys.insert(key.into(), Arc::new(value));
    }

    /// A stored value, if present and of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.keys.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    // ---------------------------
    // Errors
    // ---------------------------

    pub fn add_error(&mut self, err: Error) {
        self.errors.push(err);
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    // ---------------------------
    // Cancellation
    // ---------------------------

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn replace_deadline(&mut self, deadline: Option<Instant>) -> Option<Instant> {
        std::mem::replace(&mut self.deadline, deadline)
    }

    /// True once the current deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Resolves when the current deadline passes; never resolves without one.
    ///
    /// The returned future does not borrow the context, so a handler can race
    /// it against its own work while still writing to the context.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let deadline = self.deadline;
        async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        }
    }

    // ---------------------------
    // Response
    // ---------------------------

    /// Snapshot of the headers that will go out with the header block.
    pub fn response_headers(&self) -> HeaderMap {
        self.response.read(|state| state.writer.headers().clone())
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response.write(|state| state.writer.headers_mut().insert(name, value));
    }

    pub fn add_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response.write(|state| state.writer.headers_mut().append(name, value));
    }

    pub fn remove_header(&mut self, name: HeaderName) {
        self.response.write(|state| state.writer.headers_mut().remove(name));
    }

    /// Set the status code, sending the header block if it has not gone out yet.
    ///
    /// After the header block is sent only the tracked code changes.
    pub fn status(&mut self, code: StatusCode) {
        self.response.write(|state| {
            state.status = code;
            if !state.wrote_header {
                state.writer.write_header(code);
                state.wrote_header = true;
            }
        });
    }

    /// The most recently requested status code.
    pub fn status_code(&self) -> StatusCode {
        self.response.read(|state| state.status)
    }

    pub fn wrote_header(&self) -> bool {
        self.response.read(|state| state.wrote_header)
    }

    pub fn wrote_body(&self) -> bool {
        self.response.read(|state| state.wrote_body)
    }

    /// Append to the body, sending the header block first if needed.
    pub fn write(&mut self, data: &[u8]) {
        let result = self.response.write(|state| {
            if !state.wrote_header {
                state.writer.write_header(state.status);
                state.wrote_header = true;
            }
            let written = state.writer.write(data);
            if written.is_ok() {
                state.wrote_body = true;
            }
            written
        });
        if let Some(Err(e)) = result {
            tracing::warn!(error = %e, "Response write failed");
            self.add_error(e.into());
        }
    }

    pub fn string(&mut self, code: StatusCode, message: &str) {
        self.set_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.status(code);
        self.write(message.as_bytes());
    }

    /// Write `value` as JSON.
    ///
    /// If encoding fails the response becomes a fixed 500 error envelope and
    /// the failure is recorded in [`errors`](Self::errors).
    pub fn json<T: Serialize + ?Sized>(&mut self, code: StatusCode, value: &T) {
        self.set_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.status(code);
                self.write(&body);
            }
            Err(e) => {
                self.status(StatusCode::INTERNAL_SERVER_ERROR);
                self.write(ENCODE_FAILURE_BODY);
                self.add_error(Error::Encode(e));
            }
        }
    }

    pub fn abort_with_status_json<T: Serialize + ?Sized>(&mut self, code: StatusCode, value: &T) {
        self.abort();
        self.json(code, value);
    }

    /// Abort and write the error envelope for `err`.
    pub fn abort_with_error(&mut self, err: &HttpError) {
        self.abort_with_status_json(err.status, &err.body());
    }

    /// Replace the response writer with a decorator around it.
    pub fn wrap_writer<F>(&mut self, wrap: F)
    where
        F: FnOnce(Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter>,
    {
        self.response.write(|state| {
            let inner = std::mem::replace(&mut state.writer, Box::new(BufferedWriter::new()));
            state.writer = wrap(inner);
        });
    }

    /// Flush writer decorators. Safe to call more than once.
    pub fn finish_writer(&mut self) {
        if let Some(Err(e)) = self.response.write(|state| state.writer.finish()) {
            tracing::warn!(error = %e, "Failed to finalize response writer");
            self.add_error(e.into());
        }
    }

    /// Commit the response.
    pub fn into_response(mut self) -> Response {
        self.finish_writer();
        let parts = self.response.take().writer.into_parts();

        let mut response = Response::new(Body::from(parts.body));
        *response.status_mut() = parts.status;
        *response.headers_mut() = parts.headers;
        response
    }
}
