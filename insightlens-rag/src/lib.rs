//! # insightlens-rag
//!
//! Chunking, vector storage, and retrieval for the InsightLens document
//! assistant.
//!
//! ## Overview
//!
//! - [`ParagraphChunker`] splits documents into bounded, paragraph-aware chunks
//! - [`VectorStore`] is the storage seam, implemented by
//!   [`InMemoryVectorStore`] and the file-backed [`LocalVectorStore`]
//! - [`VectorStoreManager`] owns collection lifecycle, ingestion, and top-k queries
//! - [`EmbeddingProvider`] and [`GenerationProvider`] wrap the remote models
//! - [`RagPipeline`] composes all of the above into `load`, `ask`, and `summarize`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use insightlens_rag::{Document, LocalVectorStore, RagConfig, RagPipeline};
//! use insightlens_rag::gemini::GeminiProvider;
//!
//! let gemini = Arc::new(GeminiProvider::from_env()?);
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(gemini.clone())
//!     .generation_provider(gemini)
//!     .vector_store(Arc::new(LocalVectorStore::open("./insightlens_data").await?))
//!     .build()?;
//!
//! let document = Document::new("notes.txt", std::fs::read_to_string("notes.txt")?);
//! pipeline.load("insightlens_documents", &document, false).await?;
//! ```
//!
//! ## Features
//!
//! - `gemini` (default): [`gemini::GeminiProvider`]
//! - `openai`: [`openai::OpenAIProvider`]

pub mod backoff;
pub mod chunking;
mod collection;
pub mod config;
pub mod distance;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod inmemory;
pub mod local;
pub mod manager;
pub mod pipeline;
pub mod prompt;
pub mod vectorstore;

#[cfg(any(feature = "gemini", feature = "openai"))]
mod http;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

pub use backoff::{BackoffPolicy, PipelineTimings};
pub use chunking::{Chunker, ParagraphChunker};
pub use config::{DEFAULT_COLLECTION, RagConfig, RagConfigBuilder};
pub use distance::DistanceMetric;
pub use document::{
    CHUNK_INDEX_KEY, Chunk, Document, IndexHit, Metadata, MetadataValue, QueryResult, Record,
    SOURCE_DOCUMENT_KEY,
};
pub use embedding::{EmbedMode, EmbeddingBatcher, EmbeddingProvider};
pub use error::{RagError, Result};
pub use generation::{Generation, GenerationProvider};
pub use inmemory::InMemoryVectorStore;
pub use local::LocalVectorStore;
pub use manager::{AddReport, CollectionInfo, VectorStoreManager};
pub use pipeline::{
    AskOutcome, LoadReport, RagPipeline, RagPipelineBuilder, SummarizeOptions, SummaryReport,
};
pub use vectorstore::{MAX_COLLECTION_NAME_LEN, VectorStore, validate_collection_name};
