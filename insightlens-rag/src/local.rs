//! Persistent vector store backed by JSON files on local disk.
//!
//! [`LocalVectorStore`] keeps one file per collection under
//! `<root>/collections/<name>.json`. Collections are loaded lazily into an
//! in-process cache and every write replaces the collection file through a
//! temporary file and a rename, so an interrupted write never leaves a
//! half-written collection behind.
//!
//! The store assumes a single writing process. Concurrent writers from
//! several processes to the same directory are undefined behaviour: the last
//! rename wins and earlier writes are lost.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::collection::StoredCollection;
use crate::distance::DistanceMetric;
use crate::document::{IndexHit, MetadataValue, Record};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, validate_collection_name};

const BACKEND: &str = "Local";
const COLLECTIONS_DIR: &str = "collections";
const EXTENSION: &str = "json";

/// A [`VectorStore`] that persists collections as JSON files.
///
/// # Example
///
/// ```rust,ignore
/// use insightlens_rag::{LocalVectorStore, VectorStore};
///
/// let store = LocalVectorStore::open("./insightlens_data").await?;
/// store.ensure_exists("docs").await?;
/// ```
#[derive(Debug)]
pub struct LocalVectorStore {
    root: PathBuf,
    metric: DistanceMetric,
    cache: RwLock<HashMap<String, StoredCollection>>,
}

impl LocalVectorStore {
    /// Open (creating if needed) a store rooted at `root`, using squared L2
    /// distance for new collections.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_metric(root, DistanceMetric::default()).await
    }

    /// Open a store whose newly created collections use `metric`.
    ///
    /// Existing collections keep the metric they were created with.
    pub async fn open_with_metric(root: impl AsRef<Path>, metric: DistanceMetric) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let dir = root.join(COLLECTIONS_DIR);
        fs::create_dir_all(&dir).await.map_err(|e| {
            error!(path = %dir.display(), error = %e, "failed to create store directory");
            io_error("create store directory", &dir, &e)
        })?;
        debug!(root = %root.display(), ?metric, "opened local vector store");
        Ok(Self { root, metric, cache: RwLock::default() })
    }

    /// Directory holding this store's data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collections_dir(&self) -> PathBuf {
        self.root.join(COLLECTIONS_DIR)
    }

    fn path_for(&self, collection: &str) -> Result<PathBuf> {
        validate_collection_name(collection)?;
        Ok(self.collections_dir().join(format!("{collection}.{EXTENSION}")))
    }

    async fn read_file(&self, collection: &str) -> Result<Option<StoredCollection>> {
        let path = self.path_for(collection)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read collection", &path, &e)),
        };
        let stored: StoredCollection = serde_json::from_slice(&bytes).map_err(|e| {
            error!(path = %path.display(), error = %e, "corrupt collection file");
            RagError::storage(BACKEND, format!("corrupt collection file {}: {e}", path.display()))
        })?;
        Ok(Some(stored))
    }

    async fn write_file(&self, stored: &StoredCollection) -> Result<()> {
        let path = self.path_for(&stored.name)?;
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        let bytes = serde_json::to_vec(stored).map_err(|e| {
            RagError::storage(BACKEND, format!("failed to serialize '{}': {e}", stored.name))
        })?;
        fs::write(&tmp, &bytes).await.map_err(|e| io_error("write collection", &tmp, &e))?;
        fs::rename(&tmp, &path).await.map_err(|e| io_error("replace collection", &path, &e))?;
        debug!(collection = %stored.name, records = stored.len(), bytes = bytes.len(), "persisted collection");
        Ok(())
    }

    /// Look a collection up in the cache, loading it from disk on a miss.
    async fn cached<'a>(
        &self,
        cache: &'a mut HashMap<String, StoredCollection>,
        collection: &str,
    ) -> Result<Option<&'a mut StoredCollection>> {
        if !cache.contains_key(collection) {
            if let Some(stored) = self.read_file(collection).await? {
                cache.insert(collection.to_string(), stored);
            }
        }
        Ok(cache.get_mut(collection))
    }

    /// Apply `change` to a copy of the collection, persist the copy, and only
    /// then swap it into the cache.
    async fn modify<T>(
        &self,
        collection: &str,
        change: impl FnOnce(&mut StoredCollection) -> std::result::Result<T, String>,
    ) -> Result<T> {
        let mut cache = self.cache.write().await;
        let mut updated = match self.cached(&mut cache, collection).await? {
            Some(stored) => stored.clone(),
            None => return Err(missing(collection)),
        };
        let output = change(&mut updated).map_err(|message| RagError::storage(BACKEND, message))?;
        self.write_file(&updated).await?;
        cache.insert(collection.to_string(), updated);
        Ok(output)
    }

    /// Run a read-only closure against a collection.
    async fn inspect<T>(
        &self,
        collection: &str,
        read: impl FnOnce(&StoredCollection) -> std::result::Result<T, String>,
    ) -> Result<T> {
        let mut cache = self.cache.write().await;
        let stored = self.cached(&mut cache, collection).await?.ok_or_else(|| missing(collection))?;
        read(&*stored).map_err(|message| RagError::storage(BACKEND, message))
    }
}

fn missing(collection: &str) -> RagError {
    RagError::storage(BACKEND, format!("collection '{collection}' does not exist"))
}

fn io_error(action: &str, path: &Path, e: &std::io::Error) -> RagError {
    RagError::storage(BACKEND, format!("failed to {action} {}: {e}", path.display()))
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn ensure_exists(&self, collection: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        if self.cached(&mut cache, collection).await?.is_some() {
            return Ok(());
        }
        let stored = StoredCollection::new(collection, self.metric);
        self.write_file(&stored).await?;
        cache.insert(collection.to_string(), stored);
        debug!(collection, "created collection");
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        if self.cache.read().await.contains_key(collection) {
            return Ok(true);
        }
        let path = self.path_for(collection)?;
        fs::try_exists(&path).await.map_err(|e| io_error("check collection", &path, &e))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let dir = self.collections_dir();
        let mut entries =
            fs::read_dir(&dir).await.map_err(|e| io_error("list collections", &dir, &e))?;
        let mut names = Vec::new();
        while let Some(entry) =
            entries.next_entry().await.map_err(|e| io_error("list collections", &dir, &e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool> {
        let path = self.path_for(collection)?;
        let mut cache = self.cache.write().await;
        let cached = cache.remove(collection).is_some();
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(cached),
            Err(e) => Err(io_error("delete collection", &path, &e)),
        }
    }

    async fn upsert(&self, collection: &str, records: &[Record]) -> Result<()> {
        self.modify(collection, |stored| stored.upsert(records)).await
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<usize> {
        self.modify(collection, |stored| Ok(stored.delete(ids))).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inspect(collection, |stored| Ok(stored.len())).await
    }

    async fn ids_where(
        &self,
        collection: &str,
        key: &str,
        value: &MetadataValue,
    ) -> Result<Vec<String>> {
        self.inspect(collection, |stored| Ok(stored.ids_where(key, value))).await
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<IndexHit>> {
        self.inspect(collection, |stored| stored.search(embedding, top_k)).await
    }
}
