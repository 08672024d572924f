//! switchyard: an HTTP request-dispatch engine.
//!
//! Requests are resolved to a handler chain by method and path pattern, then
//! run through that chain under a re-entrant `next()` protocol that lets
//! middleware wrap, short-circuit and recover around business handlers.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::ServerConfig;
pub use error::Error;
pub use http::{handler, Context, Handler, HandlerFn, HttpError, HttpServer};
pub use lifecycle::Shutdown;
pub use routing::{Group, Router};
