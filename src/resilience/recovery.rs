//! Panic recovery.
//!
//! # Responsibilities
//! - Catch a panic anywhere in the rest of the chain
//! - Answer 500 if nothing has been sent yet
//! - Record the fault on the context and abort
//!
//! # Design Decisions
//! - The panic is caught at the await point of `next()`, so one recovery
//!   handler covers every handler registered after it
//! - A response already started is left as is; only the abort and the
//!   recorded error change

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::Error;
use crate::http::chain::{Handler, HandlerFn};
use crate::http::context::Context;
use crate::http::response::ErrorBody;
use crate::observability::metrics;

/// Human-readable text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Recovery middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recovery;

impl Handler for Recovery {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(ctx.next()).catch_unwind().await;
            let Err(payload) = outcome else {
                return;
            };

            let message = panic_message(payload.as_ref());
            tracing::error!(
                method = %ctx.method(),
                path = %ctx.path(),
                panic = %message,
                "Handler panicked"
            );
            metrics::record_panic();

            if !ctx.wrote_header() {
                ctx.json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &ErrorBody::new("Internal Server Error"),
                );
            }
            ctx.abort();
            ctx.add_error(Error::Panic(message));
        })
    }
}

pub fn recovery() -> HandlerFn {
    Arc::new(Recovery)
}
