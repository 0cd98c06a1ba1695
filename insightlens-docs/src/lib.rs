//! # insightlens-docs
//!
//! Document readers and summary renderers for InsightLens.
//!
//! - [`read_document`] extracts plain text from `.pdf`, `.docx`, `.txt`, and
//!   `.md` files, keyed by the lower-cased extension
//! - [`render_summary`] writes a finished summary as PDF or DOCX next to a
//!   chosen output directory
//!
//! ## Features
//!
//! - `pdf` (default): PDF extraction via `pdf-extract`, rendering via `printpdf`
//! - `docx` (default): reading and writing via `docx-rs`

pub mod error;
pub mod reader;
pub mod render;

pub use error::RenderError;
pub use reader::{DocumentKind, read_document};
pub use render::{OutputFormat, ParseFormatError, render_summary, summary_paragraphs};
