//! Data types for documents, chunks, stored records, and query results.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Metadata key naming the file a chunk came from.
pub const SOURCE_DOCUMENT_KEY: &str = "source_document";

/// Metadata key holding a chunk's position within its source document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// A scalar metadata value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A boolean flag.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Str(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Record metadata: string keys to scalar values, ordered for stable output.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A source document read from disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// File name, recorded as `source_document` on every chunk.
    pub name: String,
    /// The extracted text content.
    pub text: String,
    /// Where the text was read from, if it came from a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

impl Document {
    /// Create a document that did not come from a file.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { name: name.into(), text: text.into(), source_path: None }
    }
}

/// A bounded-size segment of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text. Never empty or whitespace-only.
    pub text: String,
    /// Position in the chunker output, starting at 0.
    pub index: usize,
    /// Name of the parent [`Document`].
    pub source_document: String,
}

impl Chunk {
    /// The record id used when this chunk is stored: `{source}_{index}`.
    pub fn record_id(&self) -> String {
        format!("{}_{}", self.source_document, self.index)
    }

    /// The metadata stored with this chunk.
    pub fn metadata(&self) -> Metadata {
        Metadata::from([
            (SOURCE_DOCUMENT_KEY.to_string(), MetadataValue::from(self.source_document.as_str())),
            (CHUNK_INDEX_KEY.to_string(), MetadataValue::from(self.index)),
        ])
    }
}

/// One embedded chunk as written to a vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Unique id within the collection.
    pub id: String,
    /// The chunk embedding.
    pub embedding: Vec<f32>,
    /// The original chunk text.
    pub document: String,
    /// Scalar metadata.
    pub metadata: Metadata,
}

/// A raw search hit as returned by a [`VectorStore`](crate::VectorStore).
///
/// Backends may return hits without document text; the store manager drops
/// those when reshaping hits into [`QueryResult`]s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexHit {
    /// Record id.
    pub id: String,
    /// Stored chunk text, if the backend has it.
    pub document: Option<String>,
    /// Stored metadata.
    pub metadata: Metadata,
    /// Distance to the query embedding (lower is closer).
    pub distance: f32,
}

/// A ranked record returned from a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    /// Record id.
    pub id: String,
    /// The chunk text.
    pub document: String,
    /// Stored metadata.
    pub metadata: Metadata,
    /// Distance to the query embedding (lower is closer).
    pub distance: f32,
}

impl QueryResult {
    /// The `source_document` metadata value, if present.
    pub fn source_document(&self) -> Option<String> {
        self.metadata.get(SOURCE_DOCUMENT_KEY).map(ToString::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_record_id_and_metadata() {
        let chunk = Chunk { text: "hello".into(), index: 4, source_document: "notes.md".into() };
        assert_eq!(chunk.record_id(), "notes.md_4");

        let metadata = chunk.metadata();
        assert_eq!(metadata[SOURCE_DOCUMENT_KEY], MetadataValue::Str("notes.md".into()));
        assert_eq!(metadata[CHUNK_INDEX_KEY], MetadataValue::Int(4));
    }

    #[test]
    fn metadata_values_keep_their_json_type() {
        let json = serde_json::json!({"a": true, "b": 3, "c": 2.5, "d": "x"});
        let metadata: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(metadata["a"], MetadataValue::Bool(true));
        assert_eq!(metadata["b"], MetadataValue::Int(3));
        assert_eq!(metadata["c"], MetadataValue::Float(2.5));
        assert_eq!(metadata["d"], MetadataValue::Str("x".into()));
    }
}
