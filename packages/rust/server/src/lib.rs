//! HTTP transport for the Draftsmith pipeline.
//!
//! A thin axum layer: handlers parse requests, call the [`Orchestrator`], and
//! map [`StageError`](draftsmith_shared::StageError)s to status codes through
//! [`ApiError`].

mod error;
mod handlers;

use std::net::SocketAddr;

use axum::Router;
use draftsmith_core::Orchestrator;
use draftsmith_shared::{DraftsmithError, Result, ServerConfig};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, ApiResult, status_for};
pub use handlers::{AppState, create_router};

/// Router with state and middleware attached.
pub fn app(orchestrator: Orchestrator) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(orchestrator))
}

/// Bind `config.host:config.port` and serve until Ctrl+C.
pub async fn serve(config: &ServerConfig, orchestrator: Orchestrator) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| DraftsmithError::config(format!("invalid server address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DraftsmithError::io(addr.to_string(), e))?;

    info!(%addr, "server listening");

    axum::serve(listener, app(orchestrator))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DraftsmithError::io(addr.to_string(), e))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received shutdown signal");
    }
}
