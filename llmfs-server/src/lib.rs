//! llmfs Server - HTTP transport for the session file tree.
//!
//! Each file operation maps to one request, so any HTTP client can drive
//! a conversation:
//!
//! ```text
//! id=$(curl -s localhost:5640/fs/new)
//! curl -X PUT --data 'hello' localhost:5640/fs/$id/ask
//! curl localhost:5640/fs/$id/ask
//! ```

#![warn(clippy::all)]

pub mod routes;

pub use routes::{AppState, ErrorResponse, HealthResponse, WriteResponse};

use axum::Router;
use llmfs_common::config::ServerConfig;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

/// Largest accepted write body.
pub const MAX_WRITE_BYTES: usize = 1024 * 1024;

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_routes(state)
        .layer(RequestBodyLimitLayer::new(MAX_WRITE_BYTES))
        .layer(cors)
}

/// Serve until `shutdown` is cancelled.
pub async fn start_server(
    config: &ServerConfig,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));
    let router = build_router(state);

    tracing::info!("Starting llmfs on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("llmfs stopped");
    Ok(())
}
