//! Vector store trait for storing and searching embedded records.

use async_trait::async_trait;

use crate::document::{IndexHit, MetadataValue, Record};
use crate::error::{RagError, Result};

/// Longest collection name accepted by [`validate_collection_name`].
pub const MAX_COLLECTION_NAME_LEN: usize = 128;

/// A storage backend for named collections of embedded records.
///
/// Collections must exist before records are written or searched; callers
/// create them with [`ensure_exists`](VectorStore::ensure_exists), which is
/// idempotent. The first record written to a collection fixes its embedding
/// dimensionality. Later records and query vectors of another length are
/// rejected with [`RagError::StorageUnavailable`].
///
/// # Example
///
/// ```rust,ignore
/// use insightlens_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.ensure_exists("docs").await?;
/// store.upsert("docs", &records).await?;
/// let hits = store.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name used in errors and logs.
    fn backend(&self) -> &'static str;

    /// Create a named collection. No-op if it already exists.
    async fn ensure_exists(&self, collection: &str) -> Result<()>;

    /// Whether a collection with this name exists.
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Names of all collections, sorted.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Delete a named collection and all its records.
    ///
    /// Returns `false` if the collection did not exist.
    async fn delete_collection(&self, collection: &str) -> Result<bool>;

    /// Insert records, replacing any record that has the same id.
    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<()>;

    /// Delete records by id. Returns how many records were removed.
    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<usize>;

    /// Number of records in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Ids of the records whose metadata maps `key` to `value`, sorted.
    async fn ids_where(
        &self,
        collection: &str,
        key: &str,
        value: &MetadataValue,
    ) -> Result<Vec<String>>;

    /// Search for the `top_k` records closest to the given embedding.
    ///
    /// Returns hits ordered by ascending distance.
    async fn search(&self, collection: &str, embedding: &[f32], top_k: usize)
    -> Result<Vec<IndexHit>>;
}

/// Check that a collection name is usable by every bundled backend.
///
/// Names are 1 to [`MAX_COLLECTION_NAME_LEN`] characters from
/// `[A-Za-z0-9_.-]` and may not start with a dot.
///
/// # Errors
///
/// Returns [`RagError::ValidationError`] describing the first problem found.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RagError::ValidationError("collection name must not be empty".to_string()));
    }
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(RagError::ValidationError(format!(
            "collection name '{name}' is longer than {MAX_COLLECTION_NAME_LEN} characters"
        )));
    }
    if name.starts_with('.') {
        return Err(RagError::ValidationError(format!(
            "collection name '{name}' must not start with '.'"
        )));
    }
    if let Some(c) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(RagError::ValidationError(format!(
            "collection name '{name}' contains invalid character '{c}'"
        )));
    }
    Ok(())
}
