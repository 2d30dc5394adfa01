//! Document ingestion.
//!
//! Turns an uploaded file into the single text representation that is sent
//! to the completion service as context:
//!
//! - spreadsheets (`.xlsx`, `.xls`) and `.csv` become a JSON array of row
//!   objects, column name to cell value, in original row order
//! - `.pdf` becomes the text of every page concatenated in page order
//!
//! # Example
//!
//! ```rust
//! use docchat::ingest::{Ingestor, UploadedFile};
//!
//! let file = UploadedFile::new("sales.csv", b"region,total\neast,100\n".to_vec());
//! let text = Ingestor::default().ingest(&file).unwrap();
//! assert_eq!(text, r#"[{"region":"east","total":100}]"#);
//! ```

mod pdf;
mod tabular;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use tabular::{Table, TablePreview};

/// Number of data rows shown in a table preview.
pub const PREVIEW_ROWS: usize = 5;

/// Which upload types the application accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptProfile {
    /// Only `.xlsx` workbooks.
    Excel,
    /// Spreadsheets, CSV and PDF.
    #[default]
    Documents,
}

impl AcceptProfile {
    /// Kinds accepted under this profile.
    #[must_use]
    pub fn kinds(self) -> &'static [DocumentKind] {
        match self {
            Self::Excel => &[DocumentKind::Xlsx],
            Self::Documents => &[
                DocumentKind::Xlsx,
                DocumentKind::Xls,
                DocumentKind::Csv,
                DocumentKind::Pdf,
            ],
        }
    }

    /// Whether `kind` may be ingested under this profile.
    #[must_use]
    pub fn accepts(self, kind: DocumentKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// Value for the HTML `accept` attribute of the upload control.
    #[must_use]
    pub fn accept_attr(self) -> String {
        self.kinds()
            .iter()
            .map(|k| format!(".{}", k.extension()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// How the document is referred to in the system instruction.
    #[must_use]
    pub fn document_label(self) -> &'static str {
        match self {
            Self::Excel => "Excel document",
            Self::Documents => "document",
        }
    }

    /// Page title for this variant.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Excel => "Play with Excel",
            Self::Documents => "Chat with your document",
        }
    }

    /// What the user is asked to upload before chatting.
    #[must_use]
    pub fn upload_hint(self) -> &'static str {
        match self {
            Self::Excel => "an Excel file",
            Self::Documents => "a document",
        }
    }
}

/// Supported upload formats, detected from the filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Xlsx,
    Xls,
    Csv,
    Pdf,
}

impl DocumentKind {
    /// Detect the kind from a filename, ignoring case.
    #[must_use]
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "csv" => Some(Self::Csv),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Csv => "csv",
            Self::Pdf => "pdf",
        }
    }

    /// Whether the kind produces row records rather than page text.
    #[must_use]
    pub fn is_tabular(self) -> bool {
        !matches!(self, Self::Pdf)
    }
}

/// An uploaded file. Lives only for the duration of an ingestion call.
#[derive(Clone)]
pub struct UploadedFile {
    /// Original filename as sent by the client.
    pub name: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Result of ingesting a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestedDocument {
    /// Original filename.
    pub name: String,
    /// Detected format.
    pub kind: DocumentKind,
    /// Serialized text handed to the completion service.
    pub text: String,
    /// Header and first rows, for tabular formats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<TablePreview>,
    /// Number of data rows, for tabular formats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    /// Number of pages, for PDFs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
}

/// Errors that can occur while ingesting an upload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// The filename suffix is not one the current profile accepts.
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    /// The file could not be parsed.
    #[error("Failed to process the file: {0}")]
    ParseFailure(String),
}

impl IngestError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            Self::ParseFailure(_) => "PARSE_FAILURE",
        }
    }
}

/// Dispatches uploads to the right parser for the configured profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ingestor {
    profile: AcceptProfile,
}

impl Ingestor {
    #[must_use]
    pub fn new(profile: AcceptProfile) -> Self {
        Self { profile }
    }

    #[must_use]
    pub fn profile(&self) -> AcceptProfile {
        self.profile
    }

    /// Serialize `file` to its document text.
    pub fn ingest(&self, file: &UploadedFile) -> Result<String, IngestError> {
        self.ingest_document(file).map(|doc| doc.text)
    }

    /// Serialize `file` and keep the metadata used for display.
    pub fn ingest_document(&self, file: &UploadedFile) -> Result<IngestedDocument, IngestError> {
        let kind = DocumentKind::from_filename(&file.name)
            .filter(|kind| self.profile.accepts(*kind))
            .ok_or_else(|| IngestError::UnsupportedType(file.name.clone()))?;

        if kind.is_tabular() {
            let table = match kind {
                DocumentKind::Csv => tabular::read_csv(&file.bytes)?,
                _ => tabular::read_workbook(kind, &file.bytes)?,
            };
            Ok(IngestedDocument {
                name: file.name.clone(),
                kind,
                text: table.to_records_json()?,
                preview: Some(table.preview(PREVIEW_ROWS)),
                rows: Some(table.rows.len()),
                pages: None,
            })
        } else {
            let pages = pdf::extract_pages(&file.bytes)?;
            Ok(IngestedDocument {
                name: file.name.clone(),
                kind,
                pages: Some(pages.len()),
                text: pages.concat(),
                preview: None,
                rows: None,
            })
        }
    }

    /// Ingest on the blocking pool so parsing never stalls the runtime.
    pub async fn ingest_upload(&self, file: UploadedFile) -> Result<IngestedDocument, IngestError> {
        let ingestor = *self;
        let name = file.name.clone();
        let started = std::time::Instant::now();

        let result = tokio::task::spawn_blocking(move || ingestor.ingest_document(&file))
            .await
            .map_err(|e| IngestError::ParseFailure(format!("Task join error: {e}")))?;

        match &result {
            Ok(doc) => tracing::info!(
                file = %name,
                kind = ?doc.kind,
                text_chars = doc.text.chars().count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Document ingested"
            ),
            Err(e) => tracing::warn!(file = %name, error = %e, "Document ingestion failed"),
        }
        result
    }
}
