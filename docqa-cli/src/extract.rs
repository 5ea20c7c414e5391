//! Document text extraction.
//!
//! Each input file becomes one [`Document`] holding the text of all its
//! pages. Files ending in `.pdf` go through the PDF extractor (the `pdf`
//! feature); everything else is read as UTF-8 text.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use docqa_rag::{Document, RagError, Result};
use tracing::{debug, warn};

/// Turns a file into plain text.
pub trait TextExtractor {
    /// Extract the full text of `path`.
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Reads the file as UTF-8 text.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| extraction_error(path, e.to_string()))
    }
}

/// Extracts the text layer of a PDF, pages in order.
#[cfg(feature = "pdf")]
pub struct PdfExtractor;

#[cfg(feature = "pdf")]
impl TextExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        // The parser panics on some malformed files.
        match std::panic::catch_unwind(|| pdf_extract::extract_text(path)) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(extraction_error(path, e.to_string())),
            Err(_) => Err(extraction_error(path, "unreadable PDF structure".to_string())),
        }
    }
}

/// A stand-in used when the binary was built without PDF support.
#[cfg(not(feature = "pdf"))]
struct UnsupportedPdf;

#[cfg(not(feature = "pdf"))]
impl TextExtractor for UnsupportedPdf {
    fn extract(&self, path: &Path) -> Result<String> {
        Err(extraction_error(path, "built without the `pdf` feature".to_string()))
    }
}

fn extraction_error(path: &Path, message: String) -> RagError {
    RagError::ExtractionError { source_name: path.display().to_string(), message }
}

fn is_pdf(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Pick the extractor for `path` by its extension.
pub fn extractor_for(path: &Path) -> &'static dyn TextExtractor {
    if is_pdf(path) {
        #[cfg(feature = "pdf")]
        return &PdfExtractor;
        #[cfg(not(feature = "pdf"))]
        return &UnsupportedPdf;
    }
    &PlainTextExtractor
}

/// Load every file as one document, ids derived from the file names.
///
/// # Errors
///
/// Returns [`RagError::ExtractionError`] for the first file that cannot be read.
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let mut seen = HashSet::new();
    let mut documents = Vec::with_capacity(paths.len());

    for path in paths {
        let text = extractor_for(path).extract(path)?;
        if text.trim().is_empty() {
            warn!(file = %path.display(), "no extractable text");
        }
        debug!(file = %path.display(), chars = text.chars().count(), "extracted text");

        let id = unique_id(&mut seen, path);
        documents.push(Document::new(id, text).with_source_uri(path.display().to_string()));
    }
    Ok(documents)
}

fn unique_id(seen: &mut HashSet<String>, path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());

    let mut id = stem.clone();
    let mut n = 1;
    while !seen.insert(id.clone()) {
        n += 1;
        id = format!("{stem}-{n}");
    }
    id
}
