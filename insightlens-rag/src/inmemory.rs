//! In-memory vector store.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. Nothing is persisted, so
//! it is suited to tests and one-off sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::collection::StoredCollection;
use crate::distance::DistanceMetric;
use crate::document::{IndexHit, MetadataValue, Record};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, validate_collection_name};

const BACKEND: &str = "InMemory";

/// An in-memory vector store using brute-force search.
///
/// # Example
///
/// ```rust,ignore
/// use insightlens_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.ensure_exists("docs").await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    metric: DistanceMetric,
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty store using squared L2 distance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty store using the given distance metric.
    pub fn with_metric(metric: DistanceMetric) -> Self {
        Self { metric, collections: RwLock::default() }
    }
}

fn missing(collection: &str) -> RagError {
    RagError::storage(BACKEND, format!("collection '{collection}' does not exist"))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn ensure_exists(&self, collection: &str) -> Result<()> {
        validate_collection_name(collection)?;
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_insert_with(|| StoredCollection::new(collection, self.metric));
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(collection))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.write().await.remove(collection).is_some())
    }

    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        stored.upsert(records).map_err(|message| RagError::storage(BACKEND, message))
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let stored = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        Ok(stored.delete(ids))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections.get(collection).map(StoredCollection::len).ok_or_else(|| missing(collection))
    }

    async fn ids_where(
        &self,
        collection: &str,
        key: &str,
        value: &MetadataValue,
    ) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let stored = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(stored.ids_where(key, value))
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<IndexHit>> {
        let collections = self.collections.read().await;
        let stored = collections.get(collection).ok_or_else(|| missing(collection))?;
        stored.search(embedding, top_k).map_err(|message| RagError::storage(BACKEND, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    fn record(id: &str, embedding: Vec<f32>) -> Record {
        Record { id: id.into(), embedding, document: id.to_uppercase(), metadata: Metadata::new() }
    }

    #[tokio::test]
    async fn operations_on_missing_collection_fail() {
        let store = InMemoryVectorStore::new();
        assert!(matches!(
            store.upsert("nope", &[record("a", vec![1.0])]).await,
            Err(RagError::StorageUnavailable { .. })
        ));
        assert!(store.search("nope", &[1.0], 1).await.is_err());
        assert!(store.count("nope").await.is_err());
    }

    #[tokio::test]
    async fn ensure_exists_is_idempotent() {
        let store = InMemoryVectorStore::new();
        store.ensure_exists("docs").await.unwrap();
        store.upsert("docs", &[record("a", vec![1.0])]).await.unwrap();
        store.ensure_exists("docs").await.unwrap();
        assert_eq!(store.count("docs").await.unwrap(), 1);
        assert_eq!(store.list_collections().await.unwrap(), vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_and_delete_reports_removed() {
        let store = InMemoryVectorStore::new();
        store.ensure_exists("docs").await.unwrap();
        store.upsert("docs", &[record("a", vec![1.0]), record("b", vec![2.0])]).await.unwrap();
        store.upsert("docs", &[record("a", vec![3.0])]).await.unwrap();
        assert_eq!(store.count("docs").await.unwrap(), 2);

        let hits = store.search("docs", &[3.0], 1).await.unwrap();
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].distance, 0.0);

        assert_eq!(store.delete("docs", &["a", "missing"]).await.unwrap(), 1);
        assert_eq!(store.count("docs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_collection_reports_whether_it_existed() {
        let store = InMemoryVectorStore::new();
        assert!(!store.delete_collection("docs").await.unwrap());
        store.ensure_exists("docs").await.unwrap();
        assert!(store.delete_collection("docs").await.unwrap());
        assert!(!store.collection_exists("docs").await.unwrap());
    }
}
