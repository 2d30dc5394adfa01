//! Completion service abstractions and the conversation orchestrator.
//!
//! # Overview
//!
//! The [`CompletionService`] trait is the seam to the hosted model. The
//! [`Orchestrator`] frames the uploaded document as a system instruction,
//! picks the history to send through a [`ContextPolicy`], and hands the
//! request to the service.
//!
//! # Drivers
//!
//! - [`GeminiDriver`]: Google Gemini `generateContent` API
//!
//! # Example
//!
//! ```rust,ignore
//! use docchat::llm::{GeminiSettings, Orchestrator};
//!
//! let orchestrator = Orchestrator::new(GeminiSettings::new("api-key"));
//! let reply = orchestrator
//!     .respond(r#"[{"region":"east","total":100}]"#, &[], "What is the total for east?")
//!     .await?;
//! ```

pub mod context;
pub mod gemini;
pub mod orchestrator;

pub use context::{ContextPolicy, FullHistory, RecentTurns};
pub use gemini::GeminiDriver;
pub use orchestrator::{Orchestrator, SubmitError};

use serde::{Deserialize, Serialize};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// API host used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Connection settings for the Gemini API.
#[derive(Clone)]
pub struct GeminiSettings {
    /// Base URL of the API host.
    pub base_url: String,
    /// API key sent as `x-goog-api-key`.
    pub api_key: String,
    /// Model identifier (e.g., `gemini-2.0-flash-exp`).
    pub model: String,
}

impl std::fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiSettings {
    /// Settings for the default model on the public endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Author of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The remote model.
    Model,
}

impl Role {
    /// Label used when displaying the turn.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "assistant",
        }
    }
}

/// One entry in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Fixed sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            response_mime_type: "text/plain".to_string(),
        }
    }
}

/// A single request to the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Framing text with the document embedded.
    pub system_instruction: String,
    /// Prior turns, oldest first.
    pub history: Vec<Turn>,
    /// The new user prompt.
    pub prompt: String,
    /// Sampling parameters.
    pub generation: GenerationConfig,
}

impl CompletionRequest {
    /// Characters of context carried by this request.
    #[must_use]
    pub fn context_chars(&self) -> usize {
        self.system_instruction.chars().count()
            + self.history.iter().map(|t| t.text.chars().count()).sum::<usize>()
            + self.prompt.chars().count()
    }
}

/// Errors returned by a completion service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Transport failure or a non-success status (quota, auth, outage).
    #[error("Completion service unavailable{}: {message}", status_suffix(.status))]
    NetworkOrQuota {
        /// HTTP status, when the service answered at all.
        status: Option<u16>,
        message: String,
    },

    /// The service answered but the reply could not be used.
    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),
}

impl ServiceError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NetworkOrQuota { .. } => "SERVICE_UNAVAILABLE",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// A remote model that answers one conversational turn.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// Produce the model's reply to `req.prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] if the request fails or the reply is unusable.
    async fn complete(&self, req: &CompletionRequest) -> Result<String, ServiceError>;
}
