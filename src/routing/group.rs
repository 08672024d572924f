//! Prefix groups for route registration.
//!
//! A group only rewrites registrations: the pattern is joined onto the
//! prefix and the group's middleware is placed in front of the route's own
//! handlers. Nothing about lookup or dispatch changes.

use axum::http::Method;

use crate::http::chain::HandlerFn;
use crate::routing::matcher::join_path;
use crate::routing::router::Router;

/// Registers routes under a shared prefix.
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
    middleware: Vec<HandlerFn>,
}

impl<'r> Group<'r> {
    pub(crate) fn new(router: &'r mut Router, prefix: &str) -> Self {
        Self {
            router,
            prefix: prefix.to_string(),
            middleware: Vec::new(),
        }
    }

    /// Middleware prepended to every route registered through this group from now on.
    pub fn with(mut self, middleware: impl IntoIterator<Item = HandlerFn>) -> Self {
        self.middleware.extend(middleware);
        self
    }

    /// A nested group; inherits this group's prefix and middleware.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            prefix: join_path(&self.prefix, prefix),
            middleware: self.middleware.clone(),
            router: &mut *self.router,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handlers: impl IntoIterator<Item = HandlerFn>,
    ) -> &mut Self {
        let full = join_path(&self.prefix, pattern);
        let chain = self.middleware.iter().cloned().chain(handlers);
        self.router.route(method, &full, chain);
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
}
