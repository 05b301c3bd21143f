//! HTTP service for the chat UI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer `{ "query": "..." }` as a `text/plain` body |
//! | `GET`  | `/documents/{name}` | Return an ingested file for a citation link |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/` | Bundled chat page |
//!
//! # Error Contract
//!
//! `/chat` answers with 200 whenever the query is accepted, even when the
//! answer is an error message. Request validation and missing documents use
//! proper statuses with a JSON body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the page can be served
//! from elsewhere during development.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::connector_fs;
use crate::pipeline::RagPipeline;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
    /// Directory citation links are resolved against.
    pub docs_root: Arc<PathBuf>,
    pub query_max_chars: usize,
}

impl AppState {
    pub fn new(config: &Config, pipeline: Arc<RagPipeline>) -> Self {
        Self {
            pipeline,
            docs_root: Arc::new(config.documents.root.clone()),
            query_max_chars: config.server.query_max_chars,
        }
    }
}

/// Builds the router with all routes and the CORS layer.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/chat", post(handle_chat))
        .route("/documents/{name}", get(handle_document))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serves until the process is terminated.
pub async fn run_server(config: &Config, pipeline: Arc<RagPipeline>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = build_router(AppState::new(config, pipeline));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, docs = %config.documents.root.display(), "server started");
    println!("RAG server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
pub struct ChatBody {
    pub query: String,
}

/// Handler for `POST /chat`.
///
/// The pipeline runs inside the body stream, so dropping the connection
/// drops the in-flight query.
async fn handle_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Response, AppError> {
    let query = body.query.trim().to_string();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let chars = body.query.chars().count();
    if chars > state.query_max_chars {
        return Err(bad_request(format!(
            "query is too long ({} characters, maximum {})",
            chars, state.query_max_chars
        )));
    }

    tracing::info!(chars, "chat query");
    let pipeline = state.pipeline.clone();
    let answer = futures::stream::once(async move {
        Ok::<_, Infallible>(pipeline.answer(&query).await)
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(answer),
    )
        .into_response())
}

// ============ GET /documents/{name} ============

/// A bare file name: one normal path component.
fn is_plain_file_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = std::path::Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Finds the file a citation name refers to.
///
/// Citation names are decoded file names, so a file whose on-disk name is
/// itself percent-encoded is matched through [`connector_fs::source_name`].
fn resolve_document(root: &std::path::Path, name: &str) -> Option<PathBuf> {
    let direct = root.join(name);
    if direct.is_file() {
        return Some(direct);
    }
    connector_fs::list_files(root)
        .ok()?
        .into_iter()
        .find(|path| connector_fs::source_name(path) == name)
}

async fn handle_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    if !is_plain_file_name(&name) {
        return Err(not_found(format!("document not found: {}", name)));
    }

    let path = resolve_document(&state.docs_root, &name)
        .ok_or_else(|| not_found(format!("document not found: {}", name)))?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to read document");
        internal(format!("failed to read document: {}", name))
    })?;

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_file_names_only() {
        assert!(is_plain_file_name("report.pdf"));
        assert!(is_plain_file_name("a b.txt"));
        assert!(is_plain_file_name("..hidden"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("."));
        assert!(!is_plain_file_name("../secret.txt"));
        assert!(!is_plain_file_name("dir/file.txt"));
        assert!(!is_plain_file_name("dir\\file.txt"));
        assert!(!is_plain_file_name("/etc/passwd"));
    }

    #[test]
    fn resolves_encoded_on_disk_names() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("plain.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("my%20notes.txt"), "y").unwrap();

        assert_eq!(
            resolve_document(tmp.path(), "plain.txt"),
            Some(tmp.path().join("plain.txt"))
        );
        assert_eq!(
            resolve_document(tmp.path(), "my notes.txt"),
            Some(tmp.path().join("my%20notes.txt"))
        );
        assert_eq!(resolve_document(tmp.path(), "missing.txt"), None);
    }
}
