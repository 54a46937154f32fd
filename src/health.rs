//! Liveness HTTP server.
//!
//! A single `GET /healthz` route so container platforms and uptime pingers
//! can see the process is alive. Carries no state and no decision logic.

use anyhow::Context as _;
use axum::Router;
use axum::routing::get;
use std::net::SocketAddr;

async fn healthz() -> &'static str {
    "quipbot is alive\n"
}

/// Bind and serve the liveness endpoint until the process exits.
pub async fn serve(addr: SocketAddr) -> crate::error::Result<()> {
    let app = Router::new().route("/healthz", get(healthz));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind health server on {addr}"))?;

    tracing::info!(%addr, "health server listening");

    axum::serve(listener, app)
        .await
        .context("health server exited")?;
    Ok(())
}
