//! PDF text extraction.

use lopdf::Document;

use super::IngestError;

/// Extract the text of each page, in page order.
pub(super) fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, IngestError> {
    let doc = Document::load_mem(bytes).map_err(|e| IngestError::ParseFailure(e.to_string()))?;
    if doc.is_encrypted() {
        return Err(IngestError::ParseFailure(
            "Encrypted PDF documents are not supported".to_string(),
        ));
    }

    // Keys are 1-based page numbers; BTreeMap iteration is page order.
    doc.get_pages()
        .keys()
        .map(|&number| {
            doc.extract_text(&[number])
                .map(|text| text.trim_end_matches(['\r', '\n']).to_string())
                .map_err(|e| IngestError::ParseFailure(format!("page {number}: {e}")))
        })
        .collect()
}
