//! Embedding provider trait and the batching layer on top of it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::backoff::BackoffPolicy;
use crate::error::{RagError, Result};

/// Whether text is embedded for storage or for searching.
///
/// Providers with asymmetric retrieval models use different task types for
/// the two; symmetric providers ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    Document,
    Query,
}

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (Gemini, OpenAI, etc.)
/// behind a unified async interface. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use insightlens_rag::{EmbedMode, EmbeddingProvider};
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world", EmbedMode::Query).await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in errors and logs.
    fn name(&self) -> &str;

    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text, mode).await?);
        }
        Ok(results)
    }
}

/// Splits large embedding jobs into provider-sized batches.
///
/// Each batch is retried according to the [`BackoffPolicy`], and consecutive
/// batches are separated by a fixed pause to stay under provider rate
/// limits. Every batch must come back with exactly one non-empty vector per
/// input.
#[derive(Clone)]
pub struct EmbeddingBatcher {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    pause: Duration,
    backoff: BackoffPolicy,
}

impl EmbeddingBatcher {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            pause: Duration::ZERO,
            backoff: BackoffPolicy::none(),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed every text for storage.
    ///
    /// # Errors
    ///
    /// The first batch that still fails after retries aborts the whole call.
    /// A batch answered with the wrong number of vectors, or with an empty
    /// vector, is [`RagError::EmbeddingCountMismatch`].
    pub async fn embed_all(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        let batches = texts.len().div_ceil(self.batch_size);
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            debug!(
                provider = self.provider.name(),
                batch = i + 1,
                batches,
                batch_size = batch.len(),
                "embedding batch"
            );
            let vectors = self
                .backoff
                .retry("embed_batch", || self.provider.embed_batch(batch, EmbedMode::Document))
                .await
                .map_err(|e| {
                    error!(provider = self.provider.name(), batch = i + 1, error = %e, "embedding batch failed");
                    e
                })?;
            check_batch(self.provider.name(), batch.len(), &vectors)?;
            embeddings.extend(vectors);
        }
        info!(provider = self.provider.name(), count = embeddings.len(), "embedded texts");
        Ok(embeddings)
    }

    /// Embed a search query.
    ///
    /// # Errors
    ///
    /// An empty vector from the provider is an [`RagError::EmbeddingError`].
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedding = self
            .backoff
            .retry("embed_query", || self.provider.embed(query, EmbedMode::Query))
            .await?;
        if embedding.is_empty() {
            error!(provider = self.provider.name(), "query embedding was empty");
            return Err(RagError::EmbeddingError {
                provider: self.provider.name().to_string(),
                message: "query embedding was empty".to_string(),
            });
        }
        if !all_finite(&embedding) {
            error!(provider = self.provider.name(), "query embedding contains non-finite values");
            return Err(non_finite(self.provider.name()));
        }
        Ok(embedding)
    }
}

fn check_batch(provider: &str, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    let usable = vectors.iter().filter(|v| !v.is_empty()).count();
    if vectors.len() != expected || usable != expected {
        error!(expected, actual = vectors.len(), usable, "embedding count mismatch");
        return Err(RagError::EmbeddingCountMismatch { expected, actual: usable });
    }
    if let Some(position) = vectors.iter().position(|v| !all_finite(v)) {
        error!(provider, position, "embedding contains non-finite values");
        return Err(non_finite(provider));
    }
    Ok(())
}

fn all_finite(vector: &[f32]) -> bool {
    vector.iter().all(|x| x.is_finite())
}

fn non_finite(provider: &str) -> RagError {
    RagError::EmbeddingError {
        provider: provider.to_string(),
        message: "embedding contains NaN or infinite values".to_string(),
    }
}

impl std::fmt::Debug for EmbeddingBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingBatcher")
            .field("provider", &self.provider.name())
            .field("batch_size", &self.batch_size)
            .field("pause", &self.pause)
            .field("backoff", &self.backoff)
            .finish()
    }
}
