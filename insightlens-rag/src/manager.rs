//! Collection lifecycle, batched ingestion, and top-k queries over a
//! [`VectorStore`].
//!
//! [`VectorStoreManager`] is the only component that writes to the store. It
//! normalizes the cosmetic mismatches callers tend to produce (missing ids,
//! short metadata lists) and rejects the structural ones (chunks without
//! embeddings).

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::document::{Metadata, MetadataValue, QueryResult, Record, SOURCE_DOCUMENT_KEY};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// A collection name and its current size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub count: usize,
}

/// What an [`add`](VectorStoreManager::add) call wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    /// Records written, including overwrites of existing ids.
    pub written: usize,
    /// Change in the collection's record count.
    pub net_new: usize,
    /// Record count after the write.
    pub total: usize,
    /// Whether the supplied ids were discarded and replaced with UUIDs.
    pub ids_regenerated: bool,
    /// Whether the supplied metadata list was padded or truncated.
    pub metadata_padded: bool,
}

/// Owns the collection lifecycle on top of a [`VectorStore`] backend.
#[derive(Clone)]
pub struct VectorStoreManager {
    store: Arc<dyn VectorStore>,
}

impl VectorStoreManager {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// The underlying backend.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Return the named collection, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for an unusable name and
    /// [`RagError::StorageUnavailable`] if the backend fails.
    pub async fn get_or_create(&self, collection: &str) -> Result<CollectionInfo> {
        self.store.ensure_exists(collection).await.map_err(|e| {
            error!(collection, error = %e, "failed to get or create collection");
            e
        })?;
        let count = self.store.count(collection).await?;
        debug!(collection, count, "collection ready");
        Ok(CollectionInfo { name: collection.to_string(), count })
    }

    /// Write a batch of chunk texts with their embeddings.
    ///
    /// `documents` and `embeddings` must be non-empty and of equal length.
    /// `ids` of the wrong length are ignored in favour of fresh UUIDv4 ids for
    /// every record. A `metadatas` list of the wrong length is padded with
    /// empty maps or truncated.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] without writing anything when
    /// the inputs are empty or misaligned, and
    /// [`RagError::StorageUnavailable`] when the backend rejects the write.
    pub async fn add(
        &self,
        collection: &str,
        documents: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Option<Vec<Metadata>>,
        ids: Option<Vec<String>>,
    ) -> Result<AddReport> {
        if documents.is_empty() || embeddings.is_empty() {
            warn!(collection, "no chunks or embeddings to add");
            return Err(RagError::ValidationError(
                "cannot add an empty batch of chunks or embeddings".to_string(),
            ));
        }
        if documents.len() != embeddings.len() {
            warn!(
                collection,
                chunks = documents.len(),
                embeddings = embeddings.len(),
                "chunk and embedding counts differ"
            );
            return Err(RagError::ValidationError(format!(
                "got {} chunks but {} embeddings",
                documents.len(),
                embeddings.len()
            )));
        }

        let len = documents.len();
        let (ids, ids_regenerated) = match ids {
            Some(ids) if ids.len() == len => (ids, false),
            supplied => {
                if let Some(supplied) = supplied {
                    warn!(collection, expected = len, actual = supplied.len(), "regenerating ids");
                }
                ((0..len).map(|_| Uuid::new_v4().to_string()).collect(), true)
            }
        };

        let mut metadatas = metadatas.unwrap_or_default();
        let metadata_padded = metadatas.len() != len;
        if metadata_padded {
            warn!(collection, expected = len, actual = metadatas.len(), "resizing metadata list");
            metadatas.resize_with(len, Metadata::new);
        }

        let records: Vec<Record> = ids
            .into_iter()
            .zip(embeddings)
            .zip(documents)
            .zip(metadatas)
            .map(|(((id, embedding), document), metadata)| Record {
                id,
                embedding,
                document,
                metadata,
            })
            .collect();

        let before = self.get_or_create(collection).await?.count;
        self.store.upsert(collection, &records).await.map_err(|e| {
            error!(collection, error = %e, "failed to add records");
            e
        })?;
        let total = self.store.count(collection).await?;

        let report = AddReport {
            written: records.len(),
            net_new: total.saturating_sub(before),
            total,
            ids_regenerated,
            metadata_padded,
        };
        info!(collection, written = report.written, total, "added records");
        Ok(report)
    }

    /// Return up to `top_k` stored chunks closest to `embedding`.
    ///
    /// A collection that has never been written to yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StorageUnavailable`] if the backend fails; callers
    /// must not treat that as "no context".
    pub async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryResult>> {
        let count = self.get_or_create(collection).await?.count;
        if count == 0 || top_k == 0 {
            debug!(collection, "query on empty collection");
            return Ok(Vec::new());
        }

        let hits = self.store.search(collection, embedding, top_k.min(count)).await.map_err(|e| {
            error!(collection, error = %e, "query failed");
            e
        })?;

        let results: Vec<QueryResult> = hits
            .into_iter()
            .filter_map(|hit| {
                let Some(document) = hit.document else {
                    debug!(collection, id = %hit.id, "skipping hit without document");
                    return None;
                };
                Some(QueryResult {
                    id: hit.id,
                    document,
                    metadata: hit.metadata,
                    distance: hit.distance,
                })
            })
            .collect();
        debug!(collection, results = results.len(), "query completed");
        Ok(results)
    }

    /// Delete a collection and everything in it.
    ///
    /// Returns `false` if there was nothing to delete; that is not an error.
    pub async fn reset(&self, collection: &str) -> Result<bool> {
        let deleted = self.store.delete_collection(collection).await.map_err(|e| {
            error!(collection, error = %e, "failed to reset collection");
            e
        })?;
        if deleted {
            info!(collection, "collection reset");
        } else {
            info!(collection, "collection did not exist; nothing to reset");
        }
        Ok(deleted)
    }

    /// Number of records in a collection; 0 when it does not exist.
    pub async fn count(&self, collection: &str) -> Result<usize> {
        if !self.store.collection_exists(collection).await? {
            return Ok(0);
        }
        self.store.count(collection).await
    }

    /// Names of all collections.
    pub async fn list(&self) -> Result<Vec<String>> {
        self.store.list_collections().await
    }

    /// Ids of the records that came from `source_document`.
    pub async fn source_ids(&self, collection: &str, source_document: &str) -> Result<Vec<String>> {
        if !self.store.collection_exists(collection).await? {
            return Ok(Vec::new());
        }
        self.store
            .ids_where(collection, SOURCE_DOCUMENT_KEY, &MetadataValue::from(source_document))
            .await
    }

    /// Delete every record that came from `source_document`. Returns how
    /// many were removed.
    pub async fn remove_source(&self, collection: &str, source_document: &str) -> Result<usize> {
        let ids = self.source_ids(collection, source_document).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let removed = self.store.delete(collection, &refs).await?;
        info!(collection, source_document, removed, "removed source records");
        Ok(removed)
    }
}

impl std::fmt::Debug for VectorStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreManager").field("backend", &self.store.backend()).finish()
    }
}
