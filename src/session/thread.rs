//! Per-user conversation state and session storage.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::ingest::{IngestError, IngestedDocument};
use crate::llm::Turn;

/// Default session timeout (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// No document ingested since the last reset.
    Empty,
    /// A document is loaded; prompts are accepted.
    Ready,
}

/// Severity of a one-shot message shown on the next render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Info,
    Error,
}

/// A one-shot message shown on the next render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Point-in-time copy of a session's conversation state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Reset counter at the time of the snapshot.
    pub epoch: u64,
    pub document: Option<IngestedDocument>,
    pub transcript: Vec<Turn>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn document_text(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.text.as_str())
    }
}

#[derive(Debug, Default)]
struct Conversation {
    document: Option<IngestedDocument>,
    transcript: Vec<Turn>,
    /// Bumped on every reset so in-flight replies can detect staleness.
    epoch: u64,
    notice: Option<Notice>,
    /// Prompt text to offer back after a failed turn.
    draft: Option<String>,
}

impl Conversation {
    fn reset(&mut self) {
        self.document = None;
        self.transcript.clear();
        self.draft = None;
        self.epoch += 1;
    }
}

/// A single user session.
///
/// Cloning is cheap; clones share the same state.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Unique session identifier.
    id: String,
    /// Document, transcript and pending notice.
    state: RwLock<Conversation>,
    /// Session creation time.
    created_at: DateTime<Utc>,
    /// Last activity time.
    last_activity: RwLock<DateTime<Utc>>,
    /// Held for the duration of a prompt round trip.
    turn_lock: tokio::sync::Mutex<()>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Create a new session with the given ID.
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(SessionInner {
                id,
                state: RwLock::new(Conversation::default()),
                created_at: now,
                last_activity: RwLock::new(now),
                turn_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if read(&self.inner.state).document.is_some() {
            SessionPhase::Ready
        } else {
            SessionPhase::Empty
        }
    }

    /// The ingested document text, if any.
    #[must_use]
    pub fn document_text(&self) -> Option<String> {
        read(&self.inner.state)
            .document
            .as_ref()
            .map(|d| d.text.clone())
    }

    /// The ingested document with its display metadata.
    #[must_use]
    pub fn document(&self) -> Option<IngestedDocument> {
        read(&self.inner.state).document.clone()
    }

    /// Get all turns in the conversation.
    #[must_use]
    pub fn transcript(&self) -> Vec<Turn> {
        read(&self.inner.state).transcript.clone()
    }

    /// Get the number of turns in the conversation.
    #[must_use]
    pub fn turn_count(&self) -> usize {
        read(&self.inner.state).transcript.len()
    }

    /// Consistent copy of epoch, document and transcript.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = read(&self.inner.state);
        SessionSnapshot {
            epoch: state.epoch,
            document: state.document.clone(),
            transcript: state.transcript.clone(),
        }
    }

    /// Discard the document and transcript.
    pub fn reset(&self) {
        write(&self.inner.state).reset();
        self.touch();
    }

    /// Apply the outcome of an upload.
    ///
    /// Any upload, successful or not, starts a fresh conversation. On failure
    /// the session is left `Empty` with an error notice.
    pub fn apply_upload(&self, result: Result<IngestedDocument, IngestError>) -> SessionPhase {
        let mut state = write(&self.inner.state);
        state.reset();
        let phase = match result {
            Ok(doc) => {
                state.notice = Some(Notice {
                    kind: NoticeKind::Success,
                    message: format!("{} extracted successfully!", doc.name),
                });
                state.document = Some(doc);
                SessionPhase::Ready
            }
            Err(e) => {
                state.notice = Some(Notice {
                    kind: NoticeKind::Error,
                    message: e.to_string(),
                });
                SessionPhase::Empty
            }
        };
        drop(state);
        self.touch();
        phase
    }

    /// Append a completed user/model exchange.
    ///
    /// Returns `false`, leaving the transcript untouched, if the session was
    /// reset after `epoch` was observed.
    pub fn record_exchange(&self, epoch: u64, prompt: &str, reply: &str) -> bool {
        let mut state = write(&self.inner.state);
        if state.epoch != epoch || state.document.is_none() {
            return false;
        }
        state.transcript.push(Turn::user(prompt));
        state.transcript.push(Turn::model(reply));
        drop(state);
        self.touch();
        true
    }

    /// Queue a message for the next render, replacing any pending one.
    pub fn set_notice(&self, kind: NoticeKind, message: impl Into<String>) {
        write(&self.inner.state).notice = Some(Notice {
            kind,
            message: message.into(),
        });
    }

    /// Take the pending message, if any.
    pub fn take_notice(&self) -> Option<Notice> {
        write(&self.inner.state).notice.take()
    }

    /// Keep a prompt to prefill the input on the next render.
    pub fn set_draft(&self, prompt: impl Into<String>) {
        write(&self.inner.state).draft = Some(prompt.into());
    }

    pub fn take_draft(&self) -> Option<String> {
        write(&self.inner.state).draft.take()
    }

    /// Serialize prompt round trips for this session.
    pub async fn begin_turn(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.inner.turn_lock.lock().await
    }

    /// Update the last activity timestamp.
    pub fn touch(&self) {
        *write(&self.inner.last_activity) = Utc::now();
    }

    /// Check if the session has expired with a custom timeout.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        let last = *read(&self.inner.last_activity);
        // A negative span means clock skew; treat as active.
        (Utc::now() - last)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }

    /// When the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }
}

/// Thread-safe store for sessions.
///
/// Provides methods for creating, retrieving, and cleaning up sessions.
/// Idle sessions are swept whenever a new one is created.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a new session store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_idle_timeout(DEFAULT_SESSION_TIMEOUT)
    }

    /// Create a store whose sessions expire after `idle_timeout` of inactivity.
    #[must_use]
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                idle_timeout,
            }),
        }
    }

    /// Create a new session and return it.
    #[must_use]
    pub fn create(&self) -> Session {
        let removed = self.cleanup_expired();
        if removed > 0 {
            tracing::info!(removed, "Expired sessions removed");
        }
        self.create_with_id(Uuid::new_v4().to_string())
    }

    /// Create a new session with a specific ID.
    #[must_use]
    pub fn create_with_id(&self, id: impl Into<String>) -> Session {
        let id = id.into();
        let session = Session::new(id.clone());
        write(&self.inner.sessions).insert(id, session.clone());
        session
    }

    /// Get a session by ID, marking it active.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        let session = read(&self.inner.sessions).get(id).cloned()?;
        session.touch();
        Some(session)
    }

    /// Remove a session by ID.
    pub fn remove(&self, id: &str) -> Option<Session> {
        write(&self.inner.sessions).remove(id)
    }

    /// Get the number of active sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.inner.sessions).len()
    }

    /// Check if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all sessions idle longer than the store's timeout.
    ///
    /// Returns the number of sessions removed.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_with_timeout(self.inner.idle_timeout)
    }

    /// Remove sessions that have been inactive longer than the timeout.
    pub fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = write(&self.inner.sessions);
        let before = guard.len();
        guard.retain(|_, session| !session.is_expired_with_timeout(timeout));
        before - guard.len()
    }

    /// List all session IDs.
    #[must_use]
    pub fn list_ids(&self) -> Vec<String> {
        read(&self.inner.sessions).keys().cloned().collect()
    }
}
