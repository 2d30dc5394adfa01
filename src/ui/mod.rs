//! Server-rendered pages.
//!
//! Pages are plain HTML forms rendered from a single template with
//! auto-escaping; no client framework is involved.
//!
//! # Structure
//!
//! - [`page`]: View models built from a session

pub mod page;

pub use page::{DocumentView, PageView, TurnView};

use minijinja::Environment;

const PAGE_TEMPLATE_NAME: &str = "page.html";
const PAGE_TEMPLATE: &str = include_str!("../../templates/page.html");

/// Renders the chat page.
#[derive(Debug)]
pub struct PageRenderer {
    env: Environment<'static>,
}

impl PageRenderer {
    /// Compile the page template.
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(PAGE_TEMPLATE_NAME, PAGE_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn render_page(&self, view: &PageView) -> Result<String, minijinja::Error> {
        self.env.get_template(PAGE_TEMPLATE_NAME)?.render(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{AcceptProfile, DocumentKind, IngestedDocument, TablePreview};
    use crate::session::{NoticeKind, SessionStore};

    fn render(view: &PageView) -> String {
        PageRenderer::new().unwrap().render_page(view).unwrap()
    }

    #[test]
    fn test_empty_session_asks_for_upload() {
        let session = SessionStore::new().create();
        let html = render(&PageView::for_session(&session, AcceptProfile::Excel));

        assert!(html.contains("<title>Play with Excel</title>"));
        assert!(html.contains(r#"accept=".xlsx""#));
        assert!(html.contains("Please upload an Excel file to start chatting."));
        assert!(!html.contains(r#"name="prompt""#));
    }

    #[test]
    fn test_ready_session_shows_preview_and_transcript() {
        let session = SessionStore::new().create();
        session.apply_upload(Ok(IngestedDocument {
            name: "sales.csv".to_string(),
            kind: DocumentKind::Csv,
            text: r#"[{"region":"east","total":100}]"#.to_string(),
            preview: Some(TablePreview {
                columns: vec!["region".to_string(), "total".to_string()],
                rows: vec![vec!["east".to_string(), "100".to_string()]],
            }),
            rows: Some(1),
            pages: None,
        }));
        let epoch = session.snapshot().epoch;
        session.record_exchange(epoch, "total for <east>?", "It is 100.");

        let html = render(&PageView::for_session(&session, AcceptProfile::Documents));
        assert!(html.contains("sales.csv extracted successfully!"));
        assert!(html.contains("<th>region</th>"));
        assert!(html.contains("<td>100</td>"));
        assert!(html.contains("assistant"));
        assert!(html.contains("total for &lt;east&gt;?"));
        assert!(html.contains(r#"name="prompt""#));
        assert!(html.contains("Thinking"));
    }

    #[test]
    fn test_notice_and_draft_render_once() {
        let session = SessionStore::new().create();
        session.set_notice(NoticeKind::Error, "quota exceeded");
        session.set_draft("what is the total?");

        let first = PageView::for_session(&session, AcceptProfile::Documents);
        assert_eq!(first.draft, "what is the total?");
        assert!(render(&first).contains("quota exceeded"));

        let second = PageView::for_session(&session, AcceptProfile::Documents);
        assert!(second.notice.is_none());
        assert!(second.draft.is_empty());
    }
}
