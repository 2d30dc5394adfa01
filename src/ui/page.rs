//! View models for the chat page.

use serde::Serialize;

use crate::ingest::{AcceptProfile, IngestedDocument, TablePreview};
use crate::session::{Notice, Session};

/// Everything the page template needs.
#[derive(Debug, Serialize)]
pub struct PageView {
    pub title: &'static str,
    pub session_id: String,
    /// Value of the upload control's `accept` attribute.
    pub accept: String,
    pub upload_hint: &'static str,
    /// Whether the prompt input is shown.
    pub ready: bool,
    pub notice: Option<Notice>,
    pub document: Option<DocumentView>,
    pub transcript: Vec<TurnView>,
    /// Prefill for the prompt input.
    pub draft: String,
}

/// Summary of the loaded document.
#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub name: String,
    pub kind: &'static str,
    pub rows: Option<usize>,
    pub pages: Option<usize>,
    pub preview: Option<TablePreview>,
}

#[derive(Debug, Serialize)]
pub struct TurnView {
    pub role: &'static str,
    pub text: String,
}

impl From<IngestedDocument> for DocumentView {
    fn from(doc: IngestedDocument) -> Self {
        Self {
            name: doc.name,
            kind: doc.kind.extension(),
            rows: doc.rows,
            pages: doc.pages,
            preview: doc.preview,
        }
    }
}

impl PageView {
    /// Build the page for `session`, consuming its pending notice and draft.
    #[must_use]
    pub fn for_session(session: &Session, profile: AcceptProfile) -> Self {
        let snapshot = session.snapshot();
        let transcript = snapshot
            .transcript
            .into_iter()
            .map(|turn| TurnView {
                role: turn.role.display_name(),
                text: turn.text,
            })
            .collect();

        Self {
            title: profile.title(),
            session_id: session.id().to_string(),
            accept: profile.accept_attr(),
            upload_hint: profile.upload_hint(),
            ready: snapshot.document.is_some(),
            notice: session.take_notice(),
            document: snapshot.document.map(DocumentView::from),
            transcript,
            draft: session.take_draft().unwrap_or_default(),
        }
    }
}
