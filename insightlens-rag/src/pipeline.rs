//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] composes a [`Chunker`], an [`EmbeddingProvider`], a
//! [`VectorStore`] (through a [`VectorStoreManager`]), and a
//! [`GenerationProvider`] into the three user-facing flows:
//!
//! - [`load`](RagPipeline::load): chunk, embed, and store a document
//! - [`ask`](RagPipeline::ask): retrieve context for a question and answer it
//! - [`summarize`](RagPipeline::summarize): map-reduce summary of a document
//!
//! # Example
//!
//! ```rust,ignore
//! use insightlens_rag::{RagPipeline, RagConfig, InMemoryVectorStore};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .generation_provider(Arc::new(my_model))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! pipeline.load("docs", &document, false).await?;
//! let outcome = pipeline.ask("docs", "What is the refund policy?", None, None).await?;
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backoff::{BackoffPolicy, PipelineTimings};
use crate::chunking::{Chunker, ParagraphChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, Document, QueryResult};
use crate::embedding::{EmbeddingBatcher, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{Generation, GenerationProvider};
use crate::manager::{AddReport, VectorStoreManager};
use crate::prompt::{self, SECTION_SEPARATOR};
use crate::vectorstore::VectorStore;

/// Documents with more chunks than this are paced with
/// [`PipelineTimings::summary_pause`] between chunk summaries.
const PACED_SUMMARY_THRESHOLD: usize = 10;

/// Result of [`RagPipeline::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadReport {
    /// The document was chunked, embedded, and written.
    Stored {
        chunks: usize,
        /// Records of an earlier load of the same document that were
        /// overwritten or removed.
        replaced: usize,
        add: AddReport,
    },
    /// Records from a document with this name already exist; nothing was
    /// written.
    AlreadyLoaded { existing: usize },
}

/// Result of [`RagPipeline::ask`].
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    /// Retrieval found nothing; no generation call was made.
    NoContext,
    Answered {
        answer: String,
        /// The retrieved chunks, closest first.
        sources: Vec<QueryResult>,
        /// How many of `sources` fit in the prompt.
        context_used: usize,
    },
    /// The generation provider refused to answer.
    Blocked { reason: String },
}

/// Knobs for [`RagPipeline::summarize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummarizeOptions {
    /// Only summarize the first `max_chunks` chunks. 0 means all.
    pub max_chunks: usize,
    /// Combine chunk summaries in groups of this size before the final
    /// synthesis, repeating until no more than this many remain. Values
    /// below 2 disable the intermediate rounds.
    pub reduce_batch_size: usize,
}

/// Result of [`RagPipeline::summarize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryReport {
    pub summary: String,
    /// Chunks considered after applying `max_chunks`.
    pub chunks_total: usize,
    /// Chunks whose summary succeeded.
    pub chunks_summarized: usize,
    /// Intermediate combine rounds run before the final synthesis.
    pub reduce_rounds: usize,
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedder: EmbeddingBatcher,
    generation_provider: Arc<dyn GenerationProvider>,
    manager: VectorStoreManager,
    chunker: Arc<dyn Chunker>,
    backoff: BackoffPolicy,
    timings: PipelineTimings,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return the store manager, for collection maintenance.
    pub fn manager(&self) -> &VectorStoreManager {
        &self.manager
    }

    /// Split a document into chunks with the configured chunker.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.chunker.chunk(document)
    }

    /// Chunk, embed, and store a document.
    ///
    /// Records are keyed `{name}_{index}` and carry `source_document` and
    /// `chunk_index` metadata. A document whose name already has records in
    /// the collection is skipped unless `force_reload` is set, in which case
    /// the old records are replaced.
    ///
    /// # Errors
    ///
    /// - [`RagError::PipelineError`] if the document produces no chunks.
    /// - Embedding errors from the provider; nothing is written in that case.
    /// - [`RagError::StorageUnavailable`] if the store fails.
    pub async fn load(
        &self,
        collection: &str,
        document: &Document,
        force_reload: bool,
    ) -> Result<LoadReport> {
        let previous = self.manager.source_ids(collection, &document.name).await?;
        let existing = previous.len();
        if existing > 0 && !force_reload {
            info!(collection, document = %document.name, existing, "document already loaded");
            return Ok(LoadReport::AlreadyLoaded { existing });
        }

        let chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            error!(document = %document.name, "document produced no chunks");
            return Err(RagError::PipelineError(format!(
                "document '{}' produced no chunks",
                document.name
            )));
        }
        debug!(document = %document.name, chunk_count = chunks.len(), "chunked document");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_all(&texts).await.map_err(|e| {
            error!(document = %document.name, error = %e, "embedding failed during load");
            e
        })?;

        let ids: Vec<String> = chunks.iter().map(Chunk::record_id).collect();
        let metadatas = chunks.iter().map(Chunk::metadata).collect();
        let documents = chunks.iter().map(|c| c.text.clone()).collect();

        // When the document is the collection's only content, clearing it
        // first lets the new vectors use another dimensionality. Otherwise
        // the new records are written first and a rejected write keeps the
        // old ones.
        let sole_source = existing > 0 && existing == self.manager.count(collection).await?;
        if sole_source {
            self.manager.remove_source(collection, &document.name).await?;
        }

        let mut add = self
            .manager
            .add(collection, documents, embeddings, Some(metadatas), Some(ids.clone()))
            .await?;

        if existing > 0 && !sole_source {
            let stale: Vec<&str> = previous
                .iter()
                .map(String::as_str)
                .filter(|id| !ids.iter().any(|new| new == id))
                .collect();
            if !stale.is_empty() {
                let removed = self.manager.store().delete(collection, &stale).await?;
                add.total = add.total.saturating_sub(removed);
                debug!(collection, document = %document.name, removed, "removed stale chunks");
            }
        }
        let replaced = existing;

        info!(
            collection,
            document = %document.name,
            chunk_count = chunks.len(),
            replaced,
            total = add.total,
            "loaded document"
        );
        Ok(LoadReport::Stored { chunks: chunks.len(), replaced, add })
    }

    /// Answer a question from the chunks stored in `collection`.
    ///
    /// `top_k` defaults to the configured value.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if `top_k` is `Some(0)`.
    /// - [`RagError::EmbeddingError`] if the query cannot be embedded.
    /// - [`RagError::StorageUnavailable`] if retrieval fails. This is never
    ///   reported as [`AskOutcome::NoContext`].
    /// - [`RagError::GenerationError`] if the answer cannot be generated.
    pub async fn ask(
        &self,
        collection: &str,
        question: &str,
        persona: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<AskOutcome> {
        let top_k = top_k.unwrap_or(self.config.top_k);
        if top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }

        let query_embedding = self.embedder.embed_query(question).await?;
        let sources = self.manager.query(collection, &query_embedding, top_k).await?;
        if sources.is_empty() {
            info!(collection, "no relevant context found");
            return Ok(AskOutcome::NoContext);
        }

        let context: Vec<&str> = sources.iter().map(|r| r.document.as_str()).collect();
        let prompt = prompt::rag_prompt(question, &context, persona, self.config.max_context_chars);
        if prompt.chunks_used < sources.len() {
            warn!(
                retrieved = sources.len(),
                used = prompt.chunks_used,
                max_context_chars = self.config.max_context_chars,
                "context truncated to fit the prompt budget"
            );
        }

        match self.generate(&prompt.text).await? {
            Generation::Answer(answer) => {
                info!(collection, context_used = prompt.chunks_used, "answered question");
                Ok(AskOutcome::Answered { answer, sources, context_used: prompt.chunks_used })
            }
            Generation::Blocked { reason } => {
                warn!(collection, %reason, "answer blocked by safety filter");
                Ok(AskOutcome::Blocked { reason })
            }
        }
    }

    /// Summarize a whole document: summarize each chunk, then combine.
    ///
    /// Chunks whose summary fails or is blocked are skipped.
    ///
    /// # Errors
    ///
    /// [`RagError::PipelineError`] if the document has no chunks, every chunk
    /// summary failed, or the final synthesis was blocked. A failed final
    /// synthesis call is returned as is.
    pub async fn summarize(
        &self,
        document: &Document,
        options: SummarizeOptions,
    ) -> Result<SummaryReport> {
        let mut chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            return Err(RagError::PipelineError(format!(
                "document '{}' produced no chunks",
                document.name
            )));
        }
        if options.max_chunks > 0 {
            chunks.truncate(options.max_chunks);
        }

        let chunks_total = chunks.len();
        let paced = chunks_total > PACED_SUMMARY_THRESHOLD && !self.timings.summary_pause.is_zero();
        let mut summaries = Vec::with_capacity(chunks_total);
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && paced {
                tokio::time::sleep(self.timings.summary_pause).await;
            }
            debug!(document = %document.name, chunk = i + 1, chunks_total, "summarizing chunk");
            match self.generate(&prompt::chunk_summary_prompt(&chunk.text)).await {
                Ok(Generation::Answer(text)) if !text.trim().is_empty() => summaries.push(text),
                Ok(Generation::Answer(_)) => {
                    warn!(chunk = i + 1, "skipping chunk with empty summary");
                }
                Ok(Generation::Blocked { reason }) => {
                    warn!(chunk = i + 1, %reason, "skipping blocked chunk summary");
                }
                Err(e) => warn!(chunk = i + 1, error = %e, "skipping chunk after summary failure"),
            }
        }

        if summaries.is_empty() {
            error!(document = %document.name, "no chunk summaries were generated");
            return Err(RagError::PipelineError(format!(
                "no chunk summaries were generated for '{}'",
                document.name
            )));
        }
        let chunks_summarized = summaries.len();

        let mut reduce_rounds = 0;
        if options.reduce_batch_size >= 2 {
            while summaries.len() > options.reduce_batch_size {
                summaries = self.combine_round(&document.name, summaries, options.reduce_batch_size).await;
                reduce_rounds += 1;
            }
        }

        let summary = match self.generate(&prompt::synthesis_prompt(&document.name, &summaries)).await? {
            Generation::Answer(text) => text,
            Generation::Blocked { reason } => {
                error!(document = %document.name, %reason, "final summary blocked");
                return Err(RagError::PipelineError(format!(
                    "final summary of '{}' was blocked: {reason}",
                    document.name
                )));
            }
        };

        info!(document = %document.name, chunks_total, chunks_summarized, reduce_rounds, "summarized document");
        Ok(SummaryReport { summary, chunks_total, chunks_summarized, reduce_rounds })
    }

    /// Merge summaries in groups of `group_size`. A group whose combine call
    /// fails is carried forward as its summaries joined verbatim.
    async fn combine_round(
        &self,
        document_name: &str,
        summaries: Vec<String>,
        group_size: usize,
    ) -> Vec<String> {
        let mut combined = Vec::with_capacity(summaries.len().div_ceil(group_size));
        for group in summaries.chunks(group_size) {
            if group.len() == 1 {
                combined.push(group[0].clone());
                continue;
            }
            match self.generate(&prompt::combine_prompt(document_name, group)).await {
                Ok(Generation::Answer(text)) if !text.trim().is_empty() => combined.push(text),
                outcome => {
                    match outcome {
                        Err(e) => warn!(error = %e, "combine failed; keeping raw summaries"),
                        _ => warn!("combine produced no text; keeping raw summaries"),
                    }
                    combined.push(group.join(SECTION_SEPARATOR));
                }
            }
        }
        combined
    }

    async fn generate(&self, prompt: &str) -> Result<Generation> {
        self.backoff
            .retry("generate", || self.generation_provider.generate(prompt))
            .await
            .map_err(|e| {
                error!(provider = self.generation_provider.name(), error = %e, "generation failed");
                e
            })
    }
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("config", &self.config)
            .field("embedder", &self.embedder)
            .field("generation_provider", &self.generation_provider.name())
            .field("manager", &self.manager)
            .field("backoff", &self.backoff)
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The config, both providers, and the vector store are required. The
/// chunker defaults to a [`ParagraphChunker`] built from the config, the
/// backoff to [`BackoffPolicy::default`], and the timings to
/// [`PipelineTimings::default`].
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    backoff: Option<BackoffPolicy>,
    timings: Option<PipelineTimings>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation provider.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Replace the default paragraph chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn timings(mut self, timings: PipelineTimings) -> Self {
        self.timings = Some(timings);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the config is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generation_provider = self
            .generation_provider
            .ok_or_else(|| RagError::ConfigError("generation_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(ParagraphChunker::from_config(&config)?),
        };
        let backoff = self.backoff.unwrap_or_default();
        let timings = self.timings.unwrap_or_default();

        let embedder = EmbeddingBatcher::new(embedding_provider, config.embedding_batch_size)
            .with_pause(timings.batch_pause)
            .with_backoff(backoff.clone());

        Ok(RagPipeline {
            config,
            embedder,
            generation_provider,
            manager: VectorStoreManager::new(vector_store),
            chunker,
            backoff,
            timings,
        })
    }
}
