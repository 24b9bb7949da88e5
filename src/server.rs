//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/get_documents` | Sorted source ids of ingested documents |
//! | `POST` | `/chat` | Ask the tutor about one document |
//! | `POST` | `/upload` | Upload a PDF (multipart field `file`) and ingest it |
//! | `GET`  | `/upload/{source_id}` | Background ingestion status |
//! | `DELETE` | `/upload/{source_id}` | Cancel a background ingestion |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `extraction_failed` (422), `internal` (500).
//!
//! # Chat request
//!
//! ```json
//! {
//!   "message": "what is the fine for speeding?",
//!   "document_source": "motor_vehicles_act.pdf",
//!   "history": [
//!     { "role": "student", "text": "hi" },
//!     { "user": "hello", "bot": "Hi! What would you like to explore?" }
//!   ]
//! }
//! ```
//!
//! History entries may use either the `{role, text}` shape or the older
//! `{user, bot}` pair shape; a pair expands to a student turn followed by a
//! tutor turn.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use socratic_tutor_core::error::ValidationError;
use socratic_tutor_core::models::{ConversationTurn, Role};
use socratic_tutor_core::responder::ReplyOutcome;

use crate::chat_log::{self, ChatLogEntry};
use crate::config::{Config, ServerConfig};
use crate::ingest::{ensure_pdf_name, ingest_pdf, sanitize_file_name, IngestError};
use crate::jobs::{IngestJobs, JobStatus};
use crate::services::Services;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub jobs: IngestJobs,
    pub upload_dir: Arc<PathBuf>,
    pub background_ingest: bool,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(services: Services, server: &ServerConfig) -> Self {
        Self {
            services,
            jobs: IngestJobs::new(),
            upload_dir: Arc::new(server.upload_dir.clone()),
            background_ingest: server.background_ingest,
            max_upload_bytes: server.max_upload_bytes,
        }
    }
}

/// Assemble the router. Public so tests can drive it without a socket.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/health", get(handle_health))
        .route("/get_documents", get(handle_get_documents))
        .route("/chat", post(handle_chat))
        .route("/upload", post(handle_upload))
        .route(
            "/upload/{source_id}",
            get(handle_job_status).delete(handle_job_cancel),
        )
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `[server].bind` and serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::open(config).await?;
    let state = AppState::new(services.clone(), &config.server);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "tutor server listening");
    println!("Tutor server listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    services.close().await;
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

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        bad_request(e.to_string())
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Invalid(v) => v.into(),
            IngestError::Extraction(x) => AppError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                code: "extraction_failed".to_string(),
                message: x.to_string(),
            },
            other => internal(other.to_string()),
        }
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

// ============ GET /get_documents ============

/// A store failure is logged and answered with an empty list.
async fn handle_get_documents(State(state): State<AppState>) -> Json<Vec<String>> {
    match state.services.store.list_sources().await {
        Ok(sources) => Json(sources),
        Err(e) => {
            warn!(error = %e, "listing documents failed");
            Json(Vec::new())
        }
    }
}

// ============ POST /chat ============

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum HistoryEntry {
    Turn {
        role: Role,
        text: String,
    },
    Pair(HistoryPair),
    /// Anything else; rejected by [`normalize_history`] with its position.
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryPair {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot: Option<String>,
}

/// Flatten mixed-shape history into ordered turns. Entries matching neither
/// shape, and pairs with neither side, are rejected.
pub fn normalize_history(
    entries: Vec<HistoryEntry>,
) -> Result<Vec<ConversationTurn>, ValidationError> {
    let mut turns = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match entry {
            HistoryEntry::Turn { role, text } => turns.push(ConversationTurn { role, text }),
            HistoryEntry::Pair(HistoryPair {
                user: None,
                bot: None,
            })
            | HistoryEntry::Other(_) => return Err(ValidationError::BadHistoryEntry(index)),
            HistoryEntry::Pair(HistoryPair { user, bot }) => {
                if let Some(user) = user {
                    turns.push(ConversationTurn::student(user));
                }
                if let Some(bot) = bot {
                    turns.push(ConversationTurn::tutor(bot));
                }
            }
        }
    }
    Ok(turns)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
    #[serde(default)]
    document_source: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField(field))
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = required(req.message, "message")?;
    let document_source = required(req.document_source, "document_source")?;
    let history = normalize_history(req.history)?;

    let services = &state.services;
    let reply = services
        .responder
        .respond(&message, &history, &document_source)
        .await;

    match &reply.outcome {
        ReplyOutcome::Answered | ReplyOutcome::NoContext => {
            info!(document = %document_source, hits = reply.hits.len(), outcome = ?reply.outcome, "chat")
        }
        ReplyOutcome::RetrievalDegraded(reason) | ReplyOutcome::Fallback(reason) => {
            warn!(document = %document_source, outcome = ?reply.outcome, reason = %reason, "chat degraded")
        }
    }

    let entry = ChatLogEntry::new(&document_source, &message, &reply.text, &history);
    chat_log::spawn_record(
        services.chat_log.clone(),
        entry,
        services.chat_log_timeout,
    );

    Ok(Json(ChatResponse {
        response: reply.text,
    }))
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    status: &'static str,
    source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks: Option<usize>,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| bad_request("No selected file"))?;

        // Validate before anything is read to disk
        ensure_pdf_name(&original)?;
        let name = sanitize_file_name(&original)?;
        ensure_pdf_name(&name)?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Failed to read file: {}", e)))?;
        upload = Some((name, bytes.to_vec()));
        break;
    }

    let (source_id, bytes) = upload.ok_or_else(|| bad_request("No file part"))?;

    tokio::fs::create_dir_all(state.upload_dir.as_ref())
        .await
        .map_err(|e| internal(format!("Failed to create upload dir: {}", e)))?;
    let path = state.upload_dir.join(&source_id);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| internal(format!("Failed to save upload: {}", e)))?;
    info!(source_id = %source_id, bytes = bytes.len(), "upload saved");

    if state.background_ingest {
        state
            .jobs
            .spawn(state.services.clone(), path, source_id.clone());
        let body = UploadResponse {
            status: "queued",
            source_id,
            chunks: None,
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let report = ingest_pdf(&state.services, &path).await?;
    let body = UploadResponse {
        status: "processed",
        source_id: report.source_id,
        chunks: Some(report.chunks),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

// ============ /upload/{source_id} ============

#[derive(Serialize)]
struct JobResponse {
    source_id: String,
    #[serde(flatten)]
    status: JobStatus,
}

async fn handle_job_status(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let status = state
        .jobs
        .status(&source_id)
        .ok_or_else(|| not_found(format!("no ingestion job for {}", source_id)))?;
    Ok(Json(JobResponse { source_id, status }))
}

async fn handle_job_cancel(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    if !state.jobs.cancel(&source_id) {
        return Err(not_found(format!(
            "no running ingestion job for {}",
            source_id
        )));
    }
    Ok(Json(JobResponse {
        source_id,
        status: JobStatus::Cancelled,
    }))
}
