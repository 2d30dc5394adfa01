use axum::{
    Router,
    extract::{DefaultBodyLimit, Form, Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;

use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::api;
use crate::config::AppConfig;
use crate::ingest::{IngestError, UploadedFile};
use crate::llm::{GeminiDriver, GeminiSettings, SubmitError};
use crate::session::{NoticeKind, Session};
use crate::ui::PageView;

/// Multipart field carrying the upload.
const FILE_FIELD: &str = "file";

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, settings: GeminiSettings) -> anyhow::Result<()> {
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        "LLM configuration loaded"
    );

    let service = Arc::new(GeminiDriver::new(settings));
    let state = AppState::new(Arc::clone(&config), service)?;

    info!(
        profile = ?config.ingest.profile,
        policy = state.orchestrator.context_policy().name(),
        idle_timeout_secs = config.session.idle_timeout_secs,
        "Application state initialized"
    );

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Build the application router around `state`.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        // HTML pages
        .route("/", get(index_handler))
        .route("/s/{id}", get(page_handler))
        .route("/s/{id}/upload", post(upload_handler))
        .route("/s/{id}/prompt", post(prompt_handler))
        .route("/s/{id}/reset", post(reset_handler))
        // JSON API
        .merge(api::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Read the `file` part of an upload form.
///
/// A missing part, or one with no name and no bytes, means the upload was
/// cleared.
pub(crate) async fn read_upload(
    multipart: &mut Multipart,
) -> Result<Option<UploadedFile>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        if name.is_empty() && bytes.is_empty() {
            return Ok(None);
        }
        return Ok(Some(UploadedFile::new(name, bytes.to_vec())));
    }
    Ok(None)
}

fn session_page(session: &Session) -> Redirect {
    Redirect::to(&format!("/s/{}", session.id()))
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET / - Start a session.
async fn index_handler(State(state): State<AppState>) -> Redirect {
    let session = state.sessions.create();
    info!(session_id = %session.id(), "Session created");
    session_page(&session)
}

/// GET /s/:id - Render the chat page.
async fn page_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(session) = state.sessions.get(&id) else {
        return Redirect::to("/").into_response();
    };

    let view = PageView::for_session(&session, state.ingestor.profile());
    match state.pages.render_page(&view) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(session_id = %id, error = %e, "Failed to render page");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

/// POST /s/:id/upload - Replace or clear the document.
async fn upload_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Redirect {
    let Some(session) = state.sessions.get(&id) else {
        return Redirect::to("/");
    };

    match read_upload(&mut multipart).await {
        Ok(Some(file)) => {
            let result = state.ingestor.ingest_upload(file).await;
            let phase = session.apply_upload(result);
            info!(session_id = %id, phase = ?phase, "Upload applied");
        }
        Ok(None) => {
            session.reset();
            info!(session_id = %id, "Document removed");
        }
        Err(e) => {
            tracing::warn!(session_id = %id, error = %e, "Failed to read upload");
            session.apply_upload(Err(IngestError::ParseFailure(e.body_text())));
        }
    }
    session_page(&session)
}

/// Form body for a prompt.
#[derive(Debug, Deserialize)]
struct PromptForm {
    #[serde(default)]
    prompt: String,
}

/// POST /s/:id/prompt - Ask a question about the document.
async fn prompt_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<PromptForm>,
) -> Redirect {
    let Some(session) = state.sessions.get(&id) else {
        return Redirect::to("/");
    };

    match state.orchestrator.submit(&session, &form.prompt).await {
        Ok(_) | Err(SubmitError::EmptyPrompt) => {}
        Err(SubmitError::NoDocument) => session.set_notice(
            NoticeKind::Info,
            format!(
                "Please upload {} to start chatting.",
                state.ingestor.profile().upload_hint()
            ),
        ),
        Err(e @ SubmitError::Service(_)) => {
            session.set_notice(NoticeKind::Error, e.to_string());
            session.set_draft(form.prompt);
        }
        Err(e @ SubmitError::Superseded) => session.set_notice(NoticeKind::Info, e.to_string()),
    }
    session_page(&session)
}

/// POST /s/:id/reset - Clear the document and transcript.
async fn reset_handler(State(state): State<AppState>, Path(id): Path<String>) -> Redirect {
    let Some(session) = state.sessions.get(&id) else {
        return Redirect::to("/");
    };
    session.reset();
    info!(session_id = %id, "Session reset");
    session_page(&session)
}
