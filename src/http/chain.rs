//! Handler chain and dispatch cursor.
//!
//! # Cursor Contract
//! ```text
//! position: None (before start) → Some(0) → Some(1) → ... → Some(len) → Some(len + 1) ...
//!
//! advance():
//!     position += 1            (always, first)
//!     if aborted or past end   → stop
//!     else                     → run handlers[position]
//! ```
//!
//! The position only ever grows. A handler that calls `Context::next` drives
//! the remainder of the chain to completion before it returns; the outer loop
//! then lands past the end and stops without re-running anything. Advancing
//! after completion or after an abort is a no-op.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::context::Context;

/// A participant in a request's handler chain.
///
/// Middleware and business handlers share this shape. A handler may call
/// [`Context::next`] to run the rest of the chain in place and then do
/// post-processing, or simply return and let the runner continue.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()>;
}

/// Shared handle to a handler; chains clone these per request.
pub type HandlerFn = Arc<dyn Handler>;

struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        (self.0)(ctx)
    }
}

/// Build a handler from a closure.
///
/// ```ignore
/// let hello = handler(|ctx| Box::pin(async move {
///     ctx.string(StatusCode::OK, "hello");
/// }));
/// ```
pub fn handler<F>(f: F) -> HandlerFn
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// The ordered handlers for one request plus the dispatch cursor over them.
#[derive(Default)]
pub(crate) struct Chain {
    handlers: Vec<HandlerFn>,
    position: Option<usize>,
}

impl Chain {
    pub(crate) fn new(handlers: Vec<HandlerFn>) -> Self {
        Self {
            handlers,
            position: None,
        }
    }

    /// Move the cursor forward and return the handler now under it, if it may run.
    pub(crate) fn advance(&mut self, aborted: bool) -> Option<HandlerFn> {
        let next = self.position.map_or(0, |p| p.saturating_add(1));
        self.position = Some(next);

        if aborted {
            return None;
        }
        self.handlers.get(next).cloned()
    }

    pub(crate) fn position(&self) -> Option<usize> {
        self.position
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> HandlerFn {
        handler(|_ctx| Box::pin(async {}))
    }

    #[test]
    fn test_cursor_starts_before_first_handler() {
        let mut chain = Chain::new(vec![noop(), noop()]);
        assert_eq!(chain.position(), None);

        assert!(chain.advance(false).is_some());
        assert_eq!(chain.position(), Some(0));
        assert!(chain.advance(false).is_some());
        assert!(chain.advance(false).is_none());
        assert_eq!(chain.position(), Some(2));
    }

    #[test]
    fn test_cursor_is_monotonic_past_end() {
        let mut chain = Chain::new(vec![noop()]);
        chain.advance(false);
        for expected in 1..5 {
            assert!(chain.advance(false).is_none());
            assert_eq!(chain.position(), Some(expected));
        }
    }

    #[test]
    fn test_abort_stops_advance() {
        let mut chain = Chain::new(vec![noop(), noop(), noop()]);
        assert!(chain.advance(false).is_some());
        assert!(chain.advance(true).is_none());
        // still moves, never hands out a handler again once aborted
        assert!(chain.advance(true).is_none());
        assert_eq!(chain.position(), Some(2));
    }

    #[test]
    fn test_empty_chain() {
        let mut chain = Chain::default();
        assert_eq!(chain.len(), 0);
        assert!(chain.advance(false).is_none());
    }
}
