//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum/hyper host, graceful shutdown)
//!     → routing::Router::dispatch
//!     → context.rs (per-request state, chain cursor)
//!     → chain.rs (handlers run in order, re-entrant advance)
//!     → writer.rs (buffered response, header block sent once)
//!     → compression.rs (optional gzip decorator over the writer)
//!     → Send to client
//! ```

pub mod chain;
pub mod compression;
pub mod context;
pub mod request;
pub mod response;
pub mod server;
pub mod writer;

pub use chain::{handler, Handler, HandlerFn};
pub use context::Context;
pub use request::{request_id, RequestId, X_REQUEST_ID};
pub use response::{ErrorBody, HttpError};
pub use server::HttpServer;
pub use writer::{BufferedWriter, ResponseParts, ResponseWriter};
