//! Plaintext HTTP liveness endpoint.
//!
//! Answers `200 OK` whenever the process is reachable. It deliberately does not
//! consult the health registry; readiness lives on the gRPC health service.
use std::future::Future;

use axum::{Router, http::StatusCode, routing::get};
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

async fn liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Router exposing the liveness probe at `path`.
pub fn router(path: &str) -> Router {
    Router::new()
        .route(path, get(liveness))
        .layer(TraceLayer::new_for_http())
}

/// Serve the liveness router until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, path: String, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().wrap_err("Failed to read health listener address")?;
    tracing::info!("HTTP health probe listening on http://{addr}{path}");

    axum::serve(listener, router(&path))
        .with_graceful_shutdown(shutdown)
        .await
        .wrap_err("HTTP health server error")
}
