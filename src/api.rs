//! JSON API over the same sessions the HTML pages use.

use axum::{
    Json, Router,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::ingest::{DocumentKind, IngestError, IngestedDocument, TablePreview};
use crate::llm::{SubmitError, Turn};
use crate::server::read_upload;
use crate::session::{Session, SessionPhase};

/// Routes under `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route(
            "/api/sessions/{id}/document",
            post(upload_document).delete(remove_document),
        )
        .route(
            "/api/sessions/{id}/messages",
            get(get_messages).post(post_message),
        )
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error body: `{"error": "...", "code": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: &'a str,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn session_not_found(id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "SESSION_NOT_FOUND",
            format!("Session not found: {id}"),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        let status = match e {
            IngestError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IngestError::ParseFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, e.code(), e.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        let status = match e {
            SubmitError::NoDocument | SubmitError::Superseded => StatusCode::CONFLICT,
            SubmitError::EmptyPrompt => StatusCode::BAD_REQUEST,
            SubmitError::Service(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, e.code(), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::new(e.status(), "INVALID_REQUEST", e.body_text())
    }
}

fn lookup(state: &AppState, id: &str) -> Result<Session, ApiError> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| ApiError::session_not_found(id))
}

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CreatedSession {
    id: String,
}

/// Document metadata without the full text.
#[derive(Debug, Serialize)]
struct DocumentSummary {
    name: String,
    kind: DocumentKind,
    text_chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<TablePreview>,
}

impl From<IngestedDocument> for DocumentSummary {
    fn from(doc: IngestedDocument) -> Self {
        Self {
            text_chars: doc.text.chars().count(),
            name: doc.name,
            kind: doc.kind,
            rows: doc.rows,
            pages: doc.pages,
            preview: doc.preview,
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionInfo {
    id: String,
    created_at: DateTime<Utc>,
    phase: SessionPhase,
    document: Option<DocumentSummary>,
    transcript: Vec<Turn>,
    /// Characters of context the next prompt would carry, before the prompt.
    context_chars: usize,
}

/// Request body for a prompt.
#[derive(Debug, Deserialize)]
struct PromptRequest {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct PromptResponse {
    reply: String,
    /// Transcript length after the exchange.
    turns: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/sessions - Create a session.
async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<CreatedSession>) {
    let session = state.sessions.create();
    tracing::info!(session_id = %session.id(), "Session created");
    (
        StatusCode::CREATED,
        Json(CreatedSession {
            id: session.id().to_string(),
        }),
    )
}

/// GET /api/sessions/:id - Get session details.
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    let session = lookup(&state, &id)?;
    let snapshot = session.snapshot();

    let context_chars = snapshot.document_text().map_or(0, |text| {
        state
            .orchestrator
            .build_request(text, &snapshot.transcript, "")
            .context_chars()
    });

    Ok(Json(SessionInfo {
        id,
        created_at: session.created_at(),
        phase: session.phase(),
        document: snapshot.document.map(DocumentSummary::from),
        transcript: snapshot.transcript,
        context_chars,
    }))
}

/// DELETE /api/sessions/:id - Delete a session.
async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match state.sessions.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

/// POST /api/sessions/:id/document - Upload a document.
async fn upload_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<DocumentSummary>, ApiError> {
    let session = lookup(&state, &id)?;

    let file = read_upload(&mut multipart)
        .await
        .map_err(|e| ApiError::new(e.status(), "INVALID_UPLOAD", e.body_text()))?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "MISSING_FILE",
                "Multipart field `file` is required",
            )
        })?;

    let result = state.ingestor.ingest_upload(file).await;
    session.apply_upload(result.clone());
    // The page shows its own notice; API callers get the status instead.
    session.take_notice();

    Ok(Json(result?.into()))
}

/// DELETE /api/sessions/:id/document - Remove the document.
async fn remove_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    lookup(&state, &id)?.reset();
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/sessions/:id/messages - Get the transcript.
async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Turn>>, ApiError> {
    Ok(Json(lookup(&state, &id)?.transcript()))
}

/// POST /api/sessions/:id/messages - Ask a question.
async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<PromptResponse>, ApiError> {
    let session = lookup(&state, &id)?;
    let Json(req) = body?;
    let reply = state.orchestrator.submit(&session, &req.prompt).await?;

    Ok(Json(PromptResponse {
        reply,
        turns: session.turn_count(),
    }))
}
