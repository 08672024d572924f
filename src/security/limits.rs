//! Request body size limit.
//!
//! # Responsibilities
//! - Cap how many body bytes later readers may consume
//!
//! # Design Decisions
//! - The limit is enforced at read time, not here: a handler that never
//!   reads the body never pays for it
//! - Overflow surfaces to the reader as `Error::BodyTooLarge`; the handler
//!   decides the response (typically 413)
//! - Nested limits keep the tighter ceiling

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::chain::{Handler, HandlerFn};
use crate::http::context::Context;

/// Body size limit middleware.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimit {
    max_bytes: usize,
}

impl BodyLimit {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl Handler for BodyLimit {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            ctx.limit_body(self.max_bytes);
            ctx.next().await;
        })
    }
}

pub fn body_limit(max_bytes: usize) -> HandlerFn {
    Arc::new(BodyLimit::new(max_bytes))
}
