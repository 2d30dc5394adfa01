//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use docchat::AppState;
use docchat::config::{AppConfig, ChatConfig, IngestConfig, ServerConfig, SessionConfig};
use docchat::ingest::AcceptProfile;
use docchat::llm::{
    CompletionRequest, CompletionService, DEFAULT_BASE_URL, DEFAULT_MODEL, ServiceError,
};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use rust_xlsxwriter::Workbook;

/// Completion service that records requests and answers `Reply #n`.
#[derive(Default)]
pub struct FakeService {
    requests: Mutex<Vec<CompletionRequest>>,
    failing: AtomicBool,
}

impl FakeService {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CompletionService for FakeService {
    async fn complete(&self, req: &CompletionRequest) -> Result<String, ServiceError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(req.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::NetworkOrQuota {
                status: Some(429),
                message: "Resource has been exhausted".to_string(),
            });
        }
        Ok(format!("Reply #{}", requests.len()))
    }
}

pub fn test_config(profile: AcceptProfile) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        },
        ingest: IngestConfig { profile },
        chat: ChatConfig {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            history_turns: None,
        },
        session: SessionConfig {
            idle_timeout_secs: 1800,
        },
    }
}

/// App state wired to a fresh [`FakeService`].
pub fn test_state(profile: AcceptProfile) -> (AppState, Arc<FakeService>) {
    let service = Arc::new(FakeService::default());
    let state = AppState::new(
        Arc::new(test_config(profile)),
        Arc::clone(&service) as Arc<dyn CompletionService>,
    )
    .unwrap();
    (state, service)
}

/// `region,total` workbook with a single `east,100` row.
pub fn sales_xlsx() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "region").unwrap();
    sheet.write_string(0, 1, "total").unwrap();
    sheet.write_string(1, 0, "east").unwrap();
    sheet.write_number(1, 1, 100.0).unwrap();
    workbook.save_to_buffer().unwrap()
}

/// PDF with one line of text per page.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
