//! HTTP server.
//!
//! Exposes the process/ask flow as a JSON API. Each client creates its own
//! session and uploads a document set into it; sessions share nothing.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/sessions` | Create an empty session |
//! | `POST` | `/sessions/{id}/process` | Index a document set, replacing any previous index |
//! | `POST` | `/sessions/{id}/ask` | Answer a question from the session's index |
//! | `DELETE` | `/sessions/{id}` | Drop a session |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "index_not_found", "message": "Please process a document before asking questions." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `index_not_found` (409),
//! `index_unusable` (409), `build_superseded` (409), `payload_too_large` (413),
//! `generation_rejected` (502), `embedding_unavailable` (503),
//! `generation_unavailable` (503), `internal` (500).
//!
//! # Sessions
//!
//! Process requests on a session are ordered by arrival. Each one bumps the
//! session's build generation before it starts building; a build that
//! finishes after a newer one started is discarded with `build_superseded`.
//! At most `max_sessions` sessions are held; creating another evicts the
//! least recently used.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use docqa_core::answer::{AnswerOutcome, SourceRef};
use docqa_core::models::Document;
use docqa_core::retrieve::Session;
use docqa_core::RagError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app::DocQa;
use crate::config::{Config, ServerConfig};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    app: Arc<DocQa>,
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    clock: Arc<AtomicU64>,
    max_sessions: usize,
    max_body_bytes: usize,
}

struct SessionEntry {
    session: Session,
    /// Bumped when a process request starts building.
    generation: u64,
    /// Logical time of the last request that touched this session.
    last_used: u64,
}

impl AppState {
    /// State with the default `[server]` limits.
    pub fn new(app: DocQa) -> Self {
        Self::with_config(app, &ServerConfig::default())
    }

    pub fn with_config(app: DocQa, server: &ServerConfig) -> Self {
        Self {
            app: Arc::new(app),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock: Arc::new(AtomicU64::new(0)),
            max_sessions: server.max_sessions.max(1),
            max_body_bytes: server.max_body_bytes,
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Build the router. Exposed for in-process tests.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);

    Router::new()
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{id}", delete(handle_delete_session))
        .route("/sessions/{id}/process", post(handle_process))
        .route("/sessions/{id}/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

/// Start the server on `[server].bind`. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = DocQa::from_config(config)?;
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, model = %app.model_name(), "server listening");
    let state = AppState::with_config(app, &config.server);
    axum::serve(listener, router(state)).await?;

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
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::IndexNotFound(_) => (StatusCode::CONFLICT, "index_not_found"),
            RagError::IndexCorrupt(_) | RagError::ModelMismatch { .. } => {
                (StatusCode::CONFLICT, "index_unusable")
            }
            RagError::GenerationUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "generation_unavailable")
            }
            RagError::EmbeddingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable")
            }
            RagError::GenerationRejected(_) => (StatusCode::BAD_GATEWAY, "generation_rejected"),
            RagError::InvalidArgument(_)
            | RagError::InvalidConfiguration(_)
            | RagError::DimensionMismatch { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.user_message(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let (status, code) = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
        } else {
            (StatusCode::BAD_REQUEST, "bad_request")
        };
        AppError {
            status,
            code,
            message: rejection.body_text(),
        }
    }
}

fn session_not_found(id: &str) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: format!("session not found: {id}"),
    }
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

// ============ Sessions ============

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: String,
}

async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let id = uuid::Uuid::new_v4().to_string();
    let mut sessions = state.sessions.write().await;

    while sessions.len() >= state.max_sessions {
        let Some(oldest) = sessions
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone())
        else {
            break;
        };
        sessions.remove(&oldest);
        info!(session = %oldest, "evicted least recently used session");
    }

    sessions.insert(
        id.clone(),
        SessionEntry {
            session: Session::new(),
            generation: 0,
            last_used: state.tick(),
        },
    );
    (StatusCode::CREATED, Json(CreateSessionResponse { session_id: id }))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    match state.sessions.write().await.remove(&id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(session_not_found(&id)),
    }
}

#[derive(Deserialize)]
struct ProcessRequest {
    documents: Vec<Document>,
}

#[derive(Serialize)]
struct ProcessResponse {
    chunks: usize,
    model: String,
}

/// Index the documents outside the lock, then swap the result in unless a
/// newer process request has started since. A failed build leaves the
/// session's previous index active.
async fn handle_process(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>, AppError> {
    let Json(req) = payload?;

    let generation = {
        let mut sessions = state.sessions.write().await;
        let entry = sessions.get_mut(&id).ok_or_else(|| session_not_found(&id))?;
        entry.generation += 1;
        entry.last_used = state.tick();
        entry.generation
    };

    let index = state.app.build_index(&req.documents).await?;
    let response = ProcessResponse {
        chunks: index.len(),
        model: index.model().to_string(),
    };

    let mut sessions = state.sessions.write().await;
    let entry = sessions.get_mut(&id).ok_or_else(|| session_not_found(&id))?;
    if entry.generation != generation {
        warn!(session = %id, generation, latest = entry.generation, "discarding superseded build");
        return Err(AppError {
            status: StatusCode::CONFLICT,
            code: "build_superseded",
            message: "A newer document upload replaced this one.".to_string(),
        });
    }
    entry.session.install(index);
    info!(session = %id, chunks = response.chunks, "session indexed");

    Ok(Json(response))
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    outcome: AnswerOutcome,
    sources: Vec<SourceRef>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(req) = payload?;

    // Snapshot the session so a concurrent rebuild never blocks on generation.
    let session = {
        let mut sessions = state.sessions.write().await;
        let entry = sessions.get_mut(&id).ok_or_else(|| session_not_found(&id))?;
        entry.last_used = state.tick();
        entry.session.clone()
    };

    let answer = state.app.ask(&session, &req.question, req.k).await?;
    Ok(Json(AskResponse {
        answer: answer.text,
        outcome: answer.outcome,
        sources: answer.sources,
    }))
}
