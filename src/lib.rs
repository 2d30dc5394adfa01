//! Document chat server.
//!
//! Upload a spreadsheet, CSV or PDF, then ask questions about it. The
//! document is serialized to text once and sent with every prompt to a hosted
//! LLM as a system instruction.
//!
//! # Architecture
//!
//! - **Server**: Axum HTML forms plus a JSON API
//! - **Ingestion**: Per-format parsers producing a single document text
//! - **Orchestration**: System instruction framing and history selection
//! - **Sessions**: In-memory per-user document and transcript
//!
//! # Modules
//!
//! - [`api`]: JSON handlers
//! - [`config`]: CLI, file and environment configuration
//! - [`ingest`]: Upload parsing
//! - [`llm`]: Completion service trait, Gemini driver and orchestrator
//! - [`server`]: Router and HTML handlers
//! - [`session`]: Session state and storage
//! - [`ui`]: Page rendering

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod config;
pub mod ingest;
pub mod llm;
pub mod server;
pub mod session;
pub mod ui;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::ingest::Ingestor;
use crate::llm::{CompletionService, Orchestrator};
use crate::session::SessionStore;
use crate::ui::PageRenderer;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator for prompt turns.
    pub orchestrator: Arc<Orchestrator>,
    /// Session store for conversation management.
    pub sessions: SessionStore,
    /// Upload parser for the configured profile.
    pub ingestor: Ingestor,
    /// Page renderer.
    pub pages: Arc<PageRenderer>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &self.orchestrator)
            .field("sessions", &self.sessions.len())
            .field("ingestor", &self.ingestor)
            .finish()
    }
}

impl AppState {
    /// Wire the application around a completion service.
    pub fn new(
        config: Arc<AppConfig>,
        service: Arc<dyn CompletionService>,
    ) -> Result<Self, minijinja::Error> {
        let profile = config.ingest.profile;
        let orchestrator = Orchestrator::with_service(service)
            .with_context_policy(config.chat.context_policy())
            .with_document_label(profile.document_label());

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            sessions: SessionStore::with_idle_timeout(config.session.idle_timeout()),
            ingestor: Ingestor::new(profile),
            pages: Arc::new(PageRenderer::new()?),
            config,
        })
    }
}
