//! Plain-text extraction keyed by file extension.
//!
//! Every failure mode (missing file, unsupported extension, a format whose
//! feature is compiled out, or an extraction error) yields `None` and logs
//! the reason, so callers only decide whether to continue.

use std::path::Path;

use tracing::{debug, error, warn};

/// Formats [`read_document`] knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
}

impl DocumentKind {
    /// Classify a path by its lower-cased extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "md" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Read the text content of a supported document.
pub fn read_document(path: impl AsRef<Path>) -> Option<String> {
    let path = path.as_ref();
    if !path.is_file() {
        error!(path = %path.display(), "file not found");
        return None;
    }

    let Some(kind) = DocumentKind::from_path(path) else {
        warn!(path = %path.display(), "unsupported file type");
        return None;
    };

    let text = match kind {
        DocumentKind::Pdf => read_pdf(path),
        DocumentKind::Docx => read_docx(path),
        DocumentKind::Text => read_text(path),
    }?;

    debug!(path = %path.display(), ?kind, chars = text.chars().count(), "document read");
    Some(text)
}

fn read_text(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read text file");
            None
        }
    }
}

#[cfg(feature = "pdf")]
fn read_pdf(path: &Path) -> Option<String> {
    match pdf_extract::extract_text(path) {
        Ok(text) => Some(text),
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to extract PDF text");
            None
        }
    }
}

#[cfg(not(feature = "pdf"))]
fn read_pdf(path: &Path) -> Option<String> {
    warn!(path = %path.display(), "PDF support is not enabled in this build");
    None
}

#[cfg(feature = "docx")]
fn read_docx(path: &Path) -> Option<String> {
    use docx_rs::{DocumentChild, ParagraphChild, RunChild};

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read DOCX file");
            return None;
        }
    };
    let docx = match docx_rs::read_docx(&bytes) {
        Ok(docx) => docx,
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to parse DOCX file");
            return None;
        }
    };

    let mut text = String::new();
    for child in &docx.document.children {
        let DocumentChild::Paragraph(paragraph) = child else { continue };
        for part in &paragraph.children {
            let ParagraphChild::Run(run) = part else { continue };
            for item in &run.children {
                match item {
                    RunChild::Text(t) => text.push_str(&t.text),
                    RunChild::Tab(_) => text.push('\t'),
                    RunChild::Break(_) => text.push('\n'),
                    _ => {}
                }
            }
        }
        text.push('\n');
    }
    Some(text)
}

#[cfg(not(feature = "docx"))]
fn read_docx(path: &Path) -> Option<String> {
    warn!(path = %path.display(), "DOCX support is not enabled in this build");
    None
}
