//! Session state and storage.
//!
//! This module provides in-memory session storage. A session holds the
//! ingested document text and the conversation transcript for one user, and
//! is identified by UUID.
//!
//! # Architecture
//!
//! - [`Session`]: one user's document, transcript and pending notice
//! - [`SessionStore`]: Thread-safe store for all active sessions
//!
//! # Example
//!
//! ```rust
//! use docchat::session::{SessionPhase, SessionStore};
//!
//! let store = SessionStore::new();
//! let session = store.create();
//! assert_eq!(session.phase(), SessionPhase::Empty);
//! assert!(session.transcript().is_empty());
//! ```

mod thread;

pub use thread::{
    Notice, NoticeKind, Session, SessionPhase, SessionSnapshot, SessionStore,
    DEFAULT_SESSION_TIMEOUT,
};
