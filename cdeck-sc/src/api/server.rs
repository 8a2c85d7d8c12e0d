//! HTTP server setup and routing

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Error, Result};
use crate::pipeline::JobQueue;
use crate::registry::JobRegistry;

/// Shared application context passed to all handlers
///
/// AppContext implements Clone, which gives us `FromRef<AppContext>` for
/// free via Axum's blanket implementation.
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<JobRegistry>,
    pub queue: JobQueue,
}

/// Build the router with all routes and middleware attached.
///
/// Separate from [`run`] so integration tests can drive the router with
/// `tower::ServiceExt::oneshot` without binding a socket.
pub fn create_router(ctx: AppContext, shared_secret: String) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/compose", post(super::handlers::compose))
        .route("/status/:job_id", get(super::handlers::job_status))
        .with_state(ctx)
        .layer(super::auth::AuthLayer { shared_secret })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until the shutdown signal resolves
pub async fn run(
    port: u16,
    ctx: AppContext,
    shared_secret: String,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(ctx, shared_secret);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
