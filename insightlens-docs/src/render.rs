//! Summary renderers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::info;

use crate::error::RenderError;

/// Where a finished summary goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Printed only; nothing is written to disk.
    #[default]
    Text,
    Pdf,
    Docx,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [Self::Text, Self::Pdf, Self::Docx];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    /// File extension of the written summary, if any file is written.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Text => None,
            Self::Pdf => Some("pdf"),
            Self::Docx => Some("docx"),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown output format '{0}', expected one of: text, pdf, docx")]
pub struct ParseFormatError(String);

impl FromStr for OutputFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == lowered)
            .ok_or_else(|| ParseFormatError(s.to_string()))
    }
}

type Writer = fn(&Path, &str, &[&str]) -> Result<(), RenderError>;

/// Blank-line separated blocks of a summary, trimmed, with empty blocks dropped.
pub fn summary_paragraphs(summary: &str) -> Vec<&str> {
    summary.split("\n\n").map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// Write `summary` for `document_name` into `out_dir` as `{stem}_summary.{ext}`.
///
/// Returns the written path, or `None` for [`OutputFormat::Text`].
pub fn render_summary(
    format: OutputFormat,
    document_name: &str,
    summary: &str,
    out_dir: &Path,
) -> Result<Option<PathBuf>, RenderError> {
    let (extension, write): (&str, Writer) = match format {
        OutputFormat::Text => return Ok(None),
        OutputFormat::Pdf => ("pdf", write_pdf),
        OutputFormat::Docx => ("docx", write_docx),
    };

    let stem = Path::new(document_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(document_name);
    let path = out_dir.join(format!("{stem}_summary.{extension}"));
    let heading = format!("Summary of: {document_name}");
    let paragraphs = summary_paragraphs(summary);

    write(&path, &heading, &paragraphs)?;

    info!(path = %path.display(), %format, paragraphs = paragraphs.len(), "summary written");
    Ok(Some(path))
}

#[cfg(feature = "pdf")]
mod pdf {
    use std::fs::File;
    use std::io::BufWriter;
    use std::path::Path;

    use printpdf::{
        BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    };

    use crate::error::RenderError;

    // US Letter with one-inch margins.
    const PAGE_WIDTH: Mm = Mm(215.9);
    const PAGE_HEIGHT: Mm = Mm(279.4);
    const MARGIN: f32 = 25.4;

    const HEADING_SIZE: f32 = 18.0;
    const BODY_SIZE: f32 = 11.0;
    const HEADING_WRAP: usize = 48;
    const BODY_WRAP: usize = 90;
    const PT_TO_MM: f32 = 0.3528;

    struct Cursor<'a> {
        doc: &'a PdfDocumentReference,
        layer: PdfLayerReference,
        y: f32,
    }

    impl Cursor<'_> {
        fn line(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
            let height = size * PT_TO_MM * 1.4;
            if self.y - height < MARGIN {
                let (page, layer) = self.doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
                self.layer = self.doc.get_page(page).get_layer(layer);
                self.y = PAGE_HEIGHT.0 - MARGIN;
            }
            self.y -= height;
            self.layer.use_text(text, size, Mm(MARGIN), Mm(self.y), font);
        }

        fn gap(&mut self, size: f32) {
            self.y -= size * PT_TO_MM;
        }
    }

    pub(super) fn write(path: &Path, heading: &str, paragraphs: &[&str]) -> Result<(), RenderError> {
        let (doc, page, layer) = PdfDocument::new(heading, PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;

        let layer = doc.get_page(page).get_layer(layer);
        let mut cursor = Cursor { doc: &doc, layer, y: PAGE_HEIGHT.0 - MARGIN };

        for line in wrap(heading, HEADING_WRAP) {
            cursor.line(&line, HEADING_SIZE, &bold);
        }
        cursor.gap(HEADING_SIZE);

        for paragraph in paragraphs {
            for source_line in paragraph.lines() {
                for line in wrap(source_line, BODY_WRAP) {
                    cursor.line(&line, BODY_SIZE, &regular);
                }
            }
            cursor.gap(BODY_SIZE);
        }

        let file = File::create(path).map_err(|e| RenderError::io(path, e))?;
        doc.save(&mut BufWriter::new(file)).map_err(|e| RenderError::Pdf(e.to_string()))
    }

    /// Greedy word wrap. Words longer than `width` get a line of their own.
    pub(super) fn wrap(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();
        for word in text.split_whitespace() {
            let needed =
                current.chars().count() + word.chars().count() + usize::from(!current.is_empty());
            if !current.is_empty() && needed > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }
}

#[cfg(feature = "pdf")]
fn write_pdf(path: &Path, heading: &str, paragraphs: &[&str]) -> Result<(), RenderError> {
    pdf::write(path, heading, paragraphs)
}

#[cfg(not(feature = "pdf"))]
fn write_pdf(_path: &Path, _heading: &str, _paragraphs: &[&str]) -> Result<(), RenderError> {
    Err(RenderError::FeatureDisabled(OutputFormat::Pdf))
}

#[cfg(feature = "docx")]
fn write_docx(path: &Path, heading: &str, paragraphs: &[&str]) -> Result<(), RenderError> {
    use docx_rs::{Docx, Paragraph, Run};

    let mut docx = Docx::new()
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text(heading).bold().size(32)));
    for paragraph in paragraphs {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*paragraph)));
    }

    let file = std::fs::File::create(path).map_err(|e| RenderError::io(path, e))?;
    docx.build().pack(file).map_err(|e| RenderError::Docx(e.to_string()))?;
    Ok(())
}

#[cfg(not(feature = "docx"))]
fn write_docx(_path: &Path, _heading: &str, _paragraphs: &[&str]) -> Result<(), RenderError> {
    Err(RenderError::FeatureDisabled(OutputFormat::Docx))
}
