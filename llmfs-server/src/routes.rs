//! HTTP routes mapping file operations onto the synthetic tree.
//!
//! ```text
//! GET  /fs/<path>?offset=&count=   file: raw bytes of one read; dir: child stats
//! PUT  /fs/<path>?offset=          one write, body is the value
//! GET  /stat/<path>                node stat
//! GET  /health                     liveness
//! ```

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use llmfs_common::logging::generate_trace_id;
use llmfs_common::Error;
use llmfs_core::vfs::mode;
use llmfs_core::{Namespace, Node, Stat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Read size when the request names none.
pub const DEFAULT_READ_COUNT: usize = 8192;
/// Largest single read served.
pub const MAX_READ_COUNT: usize = 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub namespace: Arc<Namespace>,
}

impl AppState {
    pub fn new(namespace: Arc<Namespace>) -> Self {
        Self { namespace }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Result of a write.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub written: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadQuery {
    #[serde(default)]
    pub offset: u64,
    pub count: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WriteQuery {
    #[serde(default)]
    pub offset: u64,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: Error) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
}

// ============================================================================
// Router
// ============================================================================

/// Build all routes over the given namespace.
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/fs", get(read_root))
        .route("/fs/*path", get(read_handler).put(write_handler))
        .route("/stat", get(stat_root))
        .route("/stat/*path", get(stat_handler))
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "llmfs".into(),
    })
}

async fn read_root(
    State(state): State<AppState>,
    Query(query): Query<ReadQuery>,
) -> Result<Response, ApiError> {
    read_node(&state, "/", &query)
}

async fn read_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Response, ApiError> {
    read_node(&state, &path, &query)
}

async fn write_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<WriteQuery>,
    body: Bytes,
) -> Result<Json<WriteResponse>, ApiError> {
    write_node(&state, &path, query.offset, body).await
}

async fn stat_root(State(state): State<AppState>) -> Result<Json<Stat>, ApiError> {
    stat_node(&state, "/")
}

async fn stat_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Stat>, ApiError> {
    stat_node(&state, &path)
}

// ============================================================================
// Node operations
// ============================================================================

#[tracing::instrument(skip(state), fields(trace_id = %generate_trace_id()))]
fn read_node(state: &AppState, path: &str, query: &ReadQuery) -> Result<Response, ApiError> {
    match state.namespace.resolve(path).map_err(api_error)? {
        Node::File(file) => {
            let count = query.count.unwrap_or(DEFAULT_READ_COUNT).min(MAX_READ_COUNT);
            let mut buf = vec![0u8; count];
            let n = file.read(&mut buf, query.offset).map_err(|e| {
                tracing::debug!(error = %e, "Read failed");
                api_error(e)
            })?;
            buf.truncate(n);
            Ok((
                [(header::CONTENT_TYPE, "application/octet-stream")],
                buf,
            )
                .into_response())
        }
        Node::Dir(dir) => {
            // Entries that vanish between listing and stat are skipped.
            let stats: Vec<Stat> = dir
                .children()
                .map_err(api_error)?
                .iter()
                .filter_map(|child| child.stat().ok())
                .collect();
            Ok(Json(stats).into_response())
        }
    }
}

#[tracing::instrument(skip(state, body), fields(trace_id = %generate_trace_id(), bytes = body.len()))]
async fn write_node(
    state: &AppState,
    path: &str,
    offset: u64,
    body: Bytes,
) -> Result<Json<WriteResponse>, ApiError> {
    let Node::File(file) = state.namespace.resolve(path).map_err(api_error)? else {
        return Err(api_error(Error::Permission(format!("{path} is a directory"))));
    };
    let stat = file.stat().map_err(api_error)?;
    if !mode::writable(stat.mode) {
        return Err(api_error(Error::Permission(format!("{path} is read-only"))));
    }

    let written = file.write(&body, offset).await.map_err(|e| {
        tracing::debug!(error = %e, "Write failed");
        api_error(e)
    })?;
    Ok(Json(WriteResponse { written }))
}

fn stat_node(state: &AppState, path: &str) -> Result<Json<Stat>, ApiError> {
    let stat = state
        .namespace
        .resolve(path)
        .and_then(|node| node.stat())
        .map_err(api_error)?;
    Ok(Json(stat))
}
