//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (filter + pretty or JSON output)
//! - Per-request access log middleware
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured filter
//! - The access logger is a pure observer: it never writes or aborts

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::{LogFormat, ObservabilityConfig};
use crate::http::chain::{Handler, HandlerFn};
use crate::http::context::Context;
use crate::observability::metrics;

pub const DEFAULT_FILTER: &str = "switchyard=debug,tower_http=debug";

/// Install the global subscriber. Safe to call once per process.
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    });

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Access log middleware.
///
/// Logs method, path, final status and elapsed time after the rest of the
/// chain has unwound.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger;

impl Handler for Logger {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let start = Instant::now();
            ctx.next().await;
            let elapsed = start.elapsed();

            let status = ctx.status_code().as_u16();
            tracing::info!(
                method = %ctx.method(),
                path = %ctx.path(),
                route = ctx.full_path().unwrap_or("-"),
                status,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                aborted = ctx.is_aborted(),
                errors = ctx.errors().len(),
                "Request handled"
            );
            metrics::record_request(ctx.method().as_str(), status, elapsed);
        })
    }
}

pub fn logger() -> HandlerFn {
    Arc::new(Logger)
}
