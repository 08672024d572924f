//! Request ID middleware.
//!
//! # Responsibilities
//! - Generate a random, hex-encoded request ID per request
//! - Expose it on the response as `X-Request-ID`
//! - Store it in the context under `request_id` for downstream handlers
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Always freshly generated; a client-supplied ID is not trusted

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use futures_util::future::BoxFuture;
use uuid::Uuid;

use crate::http::chain::{Handler, HandlerFn};
use crate::http::context::Context;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Context key holding the request ID as a `String`.
pub const REQUEST_ID_KEY: &str = "request_id";

/// Sets `X-Request-ID` and stores the ID in the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestId;

impl RequestId {
    /// 128 random bits as 32 lowercase hex characters.
    pub fn generate() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

impl Handler for RequestId {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let id = Self::generate();
            match HeaderValue::from_str(&id) {
                Ok(value) => ctx.set_header(X_REQUEST_ID, value),
                Err(e) => tracing::warn!(error = %e, "Request ID is not a valid header value"),
            }
            ctx.set(REQUEST_ID_KEY, id);
            ctx.next().await;
        })
    }
}

pub fn request_id() -> HandlerFn {
    Arc::new(RequestId)
}
