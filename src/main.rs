//! switchyard server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ axum/hyper host (http::server)
//!                         │
//!                         ▼
//!                     routing::Router::dispatch
//!                         │  route table lookup (method, path)
//!                         ▼
//!                     http::Context  ── global middleware ──┐
//!                         │   logging → recovery → request ID │
//!                         │   → security headers → CORS       │
//!                         │   → rate limit → body limit       │
//!                         │   → compression → timeout         │
//!                         ▼                                   │
//!                     route handlers ◀────────────────────────┘
//!                         │
//!     Client Response     ▼
//!     ◀────────────── buffered writer (optionally gzip-decorated)
//! ```

use std::path::PathBuf;

use axum::http::StatusCode;
use clap::Parser;
use serde::{Deserialize, Serialize};

use switchyard::config::{load_config, validate_config, ServerConfig};
use switchyard::http::{handler, HttpError};
use switchyard::lifecycle::startup;
use switchyard::observability::logging;
use switchyard::Router;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "switchyard", version, about = "HTTP request-dispatch engine")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Greeting {
    message: String,
}

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
}

/// Demonstration routes.
fn routes(router: &mut Router) {
    router.get(
        "/hello",
        [handler(|ctx| {
            Box::pin(async move {
                let name = ctx.query_or("name", "world").to_string();
                ctx.json(
                    StatusCode::OK,
                    &Greeting {
                        message: format!("hello, {name}"),
                    },
                );
            })
        })],
    );

    let mut users = router.group("/users");
    users.get(
        "/:id",
        [handler(|ctx| {
            Box::pin(async move {
                let id = ctx.param("id").unwrap_or_default().to_string();
                ctx.json(StatusCode::OK, &serde_json::json!({ "id": id }));
            })
        })],
    );
    users.post(
        "/",
        [handler(|ctx| {
            Box::pin(async move {
                match ctx.bind_json::<NewUser>().await {
                    Ok(user) => ctx.json(StatusCode::CREATED, &serde_json::json!({ "name": user.name })),
                    Err(e) if e.is_body_too_large() => {
                        ctx.abort_with_error(&HttpError::payload_too_large(e.to_string()));
                    }
                    Err(e) => ctx.abort_with_error(&HttpError::bad_request(e.to_string())),
                }
            })
        })],
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(|errors| {
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        })?;
    }

    logging::init(&config.observability);

    tracing::info!("switchyard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        rate_limit = config.rate_limit.enabled,
        cors = config.cors.enabled,
        compression = config.compression.enabled,
        "Configuration loaded"
    );

    startup::run(config, routes).await?;
    Ok(())
}
