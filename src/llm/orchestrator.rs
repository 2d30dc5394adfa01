//! Conversation orchestrator.
//!
//! The orchestrator manages one conversational turn against a document:
//! 1. Frame the document text as a system instruction
//! 2. Select the prior turns to resend through the [`ContextPolicy`]
//! 3. Call the [`CompletionService`]
//! 4. On success, append the user and model turns to the session
//!
//! # Example
//!
//! ```rust,ignore
//! use docchat::llm::{GeminiSettings, Orchestrator};
//! use docchat::session::SessionStore;
//!
//! let orchestrator = Orchestrator::new(GeminiSettings::new("api-key"));
//! let session = SessionStore::new().create();
//! // ... upload a document into the session ...
//! let reply = orchestrator.submit(&session, "What is the total for east?").await?;
//! ```

use std::sync::Arc;

use uuid::Uuid;

use crate::session::Session;

use super::{
    CompletionRequest, CompletionService, ContextPolicy, FullHistory, GeminiDriver,
    GeminiSettings, GenerationConfig, ServiceError, Turn,
};

/// Label used in the system instruction when none is configured.
const DEFAULT_DOCUMENT_LABEL: &str = "document";

/// Errors from submitting a prompt to a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The session has no document loaded.
    #[error("Please upload a document to start chatting.")]
    NoDocument,

    /// The prompt was blank.
    #[error("Prompt is empty")]
    EmptyPrompt,

    /// The completion service failed; the transcript is unchanged.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The session was reset while the reply was in flight.
    #[error("The conversation was reset before the reply arrived")]
    Superseded,
}

impl SubmitError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoDocument => "NO_DOCUMENT",
            Self::EmptyPrompt => "EMPTY_PROMPT",
            Self::Service(e) => e.code(),
            Self::Superseded => "SUPERSEDED",
        }
    }
}

/// Document-grounded conversation orchestrator.
///
/// Wraps a [`CompletionService`] and adds:
/// - System instruction framing
/// - History selection
/// - Per-session turn serialization
/// - Request ID tracking
#[derive(Clone)]
pub struct Orchestrator {
    service: Arc<dyn CompletionService>,
    context: Arc<dyn ContextPolicy>,
    generation: GenerationConfig,
    document_label: String,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("service", &"CompletionService")
            .field("context", &self.context)
            .field("document_label", &self.document_label)
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator backed by the Gemini API.
    #[must_use]
    pub fn new(settings: GeminiSettings) -> Self {
        Self::with_service(Arc::new(GeminiDriver::new(settings)))
    }

    /// Create an orchestrator backed by an arbitrary completion service.
    #[must_use]
    pub fn with_service(service: Arc<dyn CompletionService>) -> Self {
        Self {
            service,
            context: Arc::new(FullHistory),
            generation: GenerationConfig::default(),
            document_label: DEFAULT_DOCUMENT_LABEL.to_string(),
        }
    }

    /// Replace the history selection policy.
    #[must_use]
    pub fn with_context_policy(mut self, policy: Arc<dyn ContextPolicy>) -> Self {
        self.context = policy;
        self
    }

    /// Set how the document is described in the system instruction.
    #[must_use]
    pub fn with_document_label(mut self, label: impl Into<String>) -> Self {
        self.document_label = label.into();
        self
    }

    #[must_use]
    pub fn context_policy(&self) -> &dyn ContextPolicy {
        self.context.as_ref()
    }

    /// Frame the document for the model.
    #[must_use]
    pub fn system_instruction(&self, document_text: &str) -> String {
        format!(
            "This is an uploaded {} data: {document_text}. If the question is about the document itself, summarize it (no column name lists).",
            self.document_label
        )
    }

    /// Build the request for the next turn without sending it.
    #[must_use]
    pub fn build_request(
        &self,
        document_text: &str,
        transcript: &[Turn],
        prompt: &str,
    ) -> CompletionRequest {
        CompletionRequest {
            system_instruction: self.system_instruction(document_text),
            history: self.context.select(transcript).into_owned(),
            prompt: prompt.to_string(),
            generation: self.generation.clone(),
        }
    }

    /// Produce the model's reply to `prompt`.
    ///
    /// The transcript is not modified; callers append both turns on success.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the completion service fails.
    pub async fn respond(
        &self,
        document_text: &str,
        transcript: &[Turn],
        prompt: &str,
    ) -> Result<String, ServiceError> {
        let request_id = Uuid::new_v4().to_string();
        let req = self.build_request(document_text, transcript, prompt);

        tracing::info!(
            request_id = %request_id,
            policy = self.context.name(),
            history_turns = req.history.len(),
            dropped_turns = transcript.len().saturating_sub(req.history.len()),
            context_chars = req.context_chars(),
            "Sending completion request"
        );

        match self.service.complete(&req).await {
            Ok(reply) => {
                tracing::info!(
                    request_id = %request_id,
                    reply_chars = reply.len(),
                    "Completion received"
                );
                Ok(reply)
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    code = e.code(),
                    error = %e,
                    "Completion failed"
                );
                Err(e)
            }
        }
    }

    /// Run one prompt against a session and record the exchange.
    ///
    /// Turns within a session are serialized. On any error the transcript is
    /// left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] when the session has no document, the prompt is
    /// blank, the service fails, or the session was reset mid-flight.
    pub async fn submit(&self, session: &Session, prompt: &str) -> Result<String, SubmitError> {
        if prompt.trim().is_empty() {
            return Err(SubmitError::EmptyPrompt);
        }

        let _turn = session.begin_turn().await;
        let snapshot = session.snapshot();
        let Some(document_text) = snapshot.document_text() else {
            return Err(SubmitError::NoDocument);
        };

        let reply = self
            .respond(document_text, &snapshot.transcript, prompt)
            .await?;

        if session.record_exchange(snapshot.epoch, prompt, &reply) {
            Ok(reply)
        } else {
            tracing::warn!(session_id = %session.id(), "Discarding reply for reset session");
            Err(SubmitError::Superseded)
        }
    }
}
