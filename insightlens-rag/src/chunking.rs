//! Paragraph-aware document chunking.
//!
//! [`ParagraphChunker`] packs blank-line-separated paragraphs into chunks of
//! at most `chunk_size` characters. Paragraphs are joined with a single
//! space as long as the running buffer stays strictly below `chunk_size`.
//! A paragraph that is longer than `chunk_size` on its own is hard-split
//! into fixed windows that advance by `chunk_size - chunk_overlap`
//! characters, which is the only place consecutive chunks overlap.
//!
//! All lengths are counted in `char`s, so multi-byte text is never split
//! inside a code point.

use crate::config::RagConfig;
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s whose `index` is their position in the
/// returned `Vec`. Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no non-blank text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text on blank lines and greedily packs paragraphs into chunks.
///
/// # Example
///
/// ```rust
/// use insightlens_rag::ParagraphChunker;
///
/// let chunker = ParagraphChunker::new(1000, 150)?;
/// let chunks = chunker.split("First paragraph.\n\nSecond paragraph.");
/// assert_eq!(chunks, vec!["First paragraph. Second paragraph."]);
/// # Ok::<(), insightlens_rag::RagError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParagraphChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ParagraphChunker {
    /// Create a new `ParagraphChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: characters shared by consecutive hard-split windows
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`, since the hard-split stride would not
    /// advance.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Create a chunker from the chunk settings of a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared by consecutive hard-split windows.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into chunk strings, in source order.
    pub fn split(&self, text: &str) -> Vec<String> {
        let normalized = text.replace("\r\n", "\n");
        let paragraphs = normalized.split("\n\n").map(str::trim).filter(|p| !p.is_empty());

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for paragraph in paragraphs {
            let paragraph_len = paragraph.chars().count();

            if current_len + paragraph_len + 1 < self.chunk_size {
                if !current.is_empty() {
                    current.push(' ');
                    current_len += 1;
                }
                current.push_str(paragraph);
                current_len += paragraph_len;
                continue;
            }

            if !current.is_empty() {
                self.flush(&current, current_len, &mut chunks);
            }
            current = paragraph.to_string();
            current_len = paragraph_len;

            if current_len > self.chunk_size {
                chunks.extend(split_by_size(&current, self.chunk_size, self.chunk_overlap));
                current.clear();
                current_len = 0;
            }
        }

        if !current.is_empty() {
            self.flush(&current, current_len, &mut chunks);
        }

        chunks.retain(|chunk| !chunk.trim().is_empty());
        chunks
    }

    /// Emit a buffer, hard-splitting it if it is oversized.
    fn flush(&self, buffer: &str, buffer_len: usize, chunks: &mut Vec<String>) {
        if buffer_len > self.chunk_size {
            chunks.extend(split_by_size(buffer, self.chunk_size, self.chunk_overlap));
        } else {
            chunks.push(buffer.to_string());
        }
    }
}

/// Fixed-window splitting with overlap, counted in characters.
///
/// Windows start at every multiple of `chunk_size - chunk_overlap` below the
/// text length, so the last windows may be shorter than `chunk_size`.
fn split_by_size(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let boundaries: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let char_count = boundaries.len() - 1;
    let step = chunk_size - chunk_overlap;

    (0..char_count)
        .step_by(step)
        .map(|start| {
            let end = (start + chunk_size).min(char_count);
            text[boundaries[start]..boundaries[end]].to_string()
        })
        .collect()
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                text,
                index,
                source_document: document.name.clone(),
            })
            .collect()
    }
}
