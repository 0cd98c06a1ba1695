//! Error types for the `insightlens-rag` crate.

use thiserror::Error;

/// Errors that can occur in chunking, storage, and retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid chunking, retrieval, or batching settings.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Batch inputs that cannot be written, such as chunks and embeddings
    /// of different lengths.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The vector store could not complete an operation.
    ///
    /// Distinct from an empty query result: callers use it to tell "could
    /// not query" apart from "no relevant context".
    #[error("Vector store unavailable ({backend}): {message}")]
    StorageUnavailable {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding call succeeded but returned the wrong number of vectors.
    #[error("Embedding provider returned {actual} vectors for {expected} inputs")]
    EmbeddingCountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },

    /// An error occurred during answer or summary generation.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error in the retrieval pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Shorthand for a [`RagError::StorageUnavailable`] from a backend name.
    pub fn storage(backend: &str, message: impl Into<String>) -> Self {
        Self::StorageUnavailable { backend: backend.to_string(), message: message.into() }
    }

    /// Whether the error came from a remote embedding or generation call.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingError { .. }
                | Self::EmbeddingCountMismatch { .. }
                | Self::GenerationError { .. }
        )
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
