//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the global middleware stack from a validated configuration
//! - Start background tasks (metrics listener, rate-limit sweeper)
//! - Bind the listener and serve until a shutdown signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Middleware order is fixed; configuration only switches pieces on or off
//! - Listener binds last (traffic only when ready)
//! - Shutdown waits a bounded grace period for in-flight requests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::http::compression::gzip;
use crate::http::request::request_id;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_signal;
use crate::observability::{logger, metrics};
use crate::resilience::{recovery, timeout};
use crate::routing::Router;
use crate::security::cors::{cors, CorsError, CorsPolicy};
use crate::security::headers::security_headers;
use crate::security::limits::body_limit;
use crate::security::rate_limit::{rate_limit, RateLimiter};

/// Errors that stop the server from starting or running.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid CORS policy: {0}")]
    Cors(#[from] CorsError),

    #[error("invalid address for {field}: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A configured router plus the shared state its middleware needs at runtime.
pub struct AppStack {
    pub router: Router,
    /// Present when rate limiting is enabled; its sweeper must be started.
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

/// Install the configured global middleware on a fresh router.
///
/// Order: logging, recovery, request ID, security headers, CORS, rate
/// limit, body limit, compression, timeout.
pub fn build_router(config: &ServerConfig) -> Result<AppStack, StartupError> {
    let mut router = Router::new();
    router.use_middleware([logger(), recovery(), request_id()]);

    if config.security.headers_enabled {
        router.use_middleware([security_headers(config.security.hsts)]);
    }

    if config.cors.enabled {
        let policy = CorsPolicy::new(config.cors.options.clone())?;
        router.use_middleware([cors(policy)]);
    }

    let rate_limiter = if config.rate_limit.enabled {
        let settings = &config.rate_limit;
        let limiter = Arc::new(
            RateLimiter::new(settings.max_requests, Duration::from_secs(settings.window_secs))
                .with_retention(Duration::from_secs(settings.retention_secs)),
        );
        router.use_middleware([rate_limit(limiter.clone())]);
        Some(limiter)
    } else {
        None
    };

    if config.security.max_body_bytes > 0 {
        router.use_middleware([body_limit(config.security.max_body_bytes)]);
    }

    if config.compression.enabled {
        router.use_middleware([gzip(config.compression.level)]);
    }

    if config.timeouts.enabled {
        router.use_middleware([timeout(config.timeouts.request())]);
    }

    Ok(AppStack {
        router,
        rate_limiter,
    })
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

/// Build, bind and serve until SIGINT/SIGTERM.
///
/// `routes` registers the application's handlers on the configured router.
pub async fn run(config: ServerConfig, routes: fn(&mut Router)) -> Result<(), StartupError> {
    let AppStack {
        mut router,
        rate_limiter,
    } = build_router(&config)?;
    routes(&mut router);

    if config.observability.metrics_enabled {
        let addr = parse_addr(
            "observability.metrics_address",
            &config.observability.metrics_address,
        )?;
        metrics::init_metrics(addr)?;
    }

    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    let shutdown = Shutdown::new();
    let sweeper = rate_limiter.map(|limiter| {
        limiter.spawn_sweeper(
            Duration::from_secs(config.rate_limit.sweep_interval_secs),
            shutdown.subscribe(),
        )
    });

    let mut server = tokio::spawn(HttpServer::new(router).run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut server => {
            shutdown.trigger();
            return result?.map_err(StartupError::Serve);
        }
        signal = wait_for_signal() => {
            tracing::info!(signal, "Shutdown signal received");
        }
    }

    shutdown.trigger();
    let grace = config.timeouts.shutdown_grace();
    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => result?.map_err(StartupError::Serve)?,
        Err(_) => {
            tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, dropping connections");
            server.abort();
        }
    }

    if let Some(sweeper) = sweeper {
        sweeper.await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
