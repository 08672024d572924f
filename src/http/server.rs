//! HTTP server setup.
//!
//! # Responsibilities
//! - Host the dispatcher behind an axum fallback route
//! - Attach `TraceLayer` for per-request spans
//! - Bind to a listener and serve with connection info
//! - Drain in-flight requests on shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router as AxumRouter,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::routing::Router;

/// HTTP server for the dispatch engine.
pub struct HttpServer {
    router: Arc<Router>,
}

impl HttpServer {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The axum router every request goes through.
    ///
    /// All paths and methods land on one fallback so route matching stays
    /// with the engine's own table.
    pub fn host_router(&self) -> AxumRouter {
        AxumRouter::new()
            .fallback(serve_request)
            .with_state(self.router.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .host_router()
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// The peer address travels as a `ConnectInfo` extension; the dispatcher
/// picks it up from there.
async fn serve_request(State(router): State<Arc<Router>>, request: Request<Body>) -> Response {
    router.dispatch(request, None).await
}
