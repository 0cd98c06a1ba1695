//! OpenAI embedding and chat-completion provider.
//!
//! This module is only available when the `openai` feature is enabled. Any
//! OpenAI-compatible server works through [`OpenAIProvider::with_base_url`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::embedding::{EmbedMode, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{Generation, GenerationProvider};
use crate::http::{self, DEFAULT_TIMEOUT};

const PROVIDER: &str = "OpenAI";

/// The default OpenAI API base URL.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const CONTENT_FILTER: &str = "content_filter";

/// An [`EmbeddingProvider`] and [`GenerationProvider`] backed by the OpenAI
/// REST API.
///
/// Embeddings are symmetric, so [`EmbedMode`] is ignored.
///
/// # Configuration
///
/// - `api_key` from the constructor or the `OPENAI_API_KEY` environment variable.
/// - `base_url` defaults to `https://api.openai.com/v1`, or `OPENAI_BASE_URL`.
/// - `dimensions` is an optional Matryoshka dimension override.
///
/// # Example
///
/// ```rust,ignore
/// use insightlens_rag::openai::OpenAIProvider;
///
/// let provider = OpenAIProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world", EmbedMode::Document).await?;
/// ```
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
    chat_model: String,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIProvider {
    /// Create a new provider with the given API key and default models.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".to_string()));
        }

        Ok(Self {
            client: client(DEFAULT_TIMEOUT)?,
            api_key,
            base_url: OPENAI_API_BASE.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
            chat_model: DEFAULT_CHAT_MODEL.into(),
            request_dimensions: None,
        })
    }

    /// Create a new provider from `OPENAI_API_KEY`, honouring
    /// `OPENAI_BASE_URL` when it is set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::ConfigError("OPENAI_API_KEY environment variable not set".into())
        })?;
        let provider = Self::new(api_key)?;
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => provider.with_base_url(url),
            _ => provider,
        })
    }

    /// Replace the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = client(timeout)?;
        Ok(self)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the embedding model name (e.g. `text-embedding-3-large`).
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set the chat model name (e.g. `gpt-4o`).
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Ask the API for embeddings truncated to `dims` dimensions.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.request_dimensions = Some(dims);
        self
    }
}

fn client(timeout: Duration) -> Result<Client> {
    http::build_client(timeout, HeaderMap::new()).map_err(|e| RagError::ConfigError(e.to_string()))
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

impl EmbeddingResponse {
    /// Vectors in input order. The API tags each with its input index.
    fn into_vectors(mut self) -> Vec<Vec<f32>> {
        self.data.sort_by_key(|d| d.index);
        self.data.into_iter().map(|d| d.embedding).collect()
    }
}

impl ChatResponse {
    fn into_generation(self) -> Generation {
        let Some(choice) = self.choices.into_iter().next() else {
            return Generation::Blocked { reason: "no choices returned".to_string() };
        };
        if choice.finish_reason.as_deref() == Some(CONTENT_FILTER) {
            return Generation::Blocked { reason: CONTENT_FILTER.to_string() };
        }
        match choice.message {
            Some(ChatResponseMessage { refusal: Some(refusal), .. }) => {
                Generation::Blocked { reason: refusal }
            }
            Some(ChatResponseMessage { content: Some(content), .. }) if !content.is_empty() => {
                Generation::Answer(content)
            }
            _ => Generation::Blocked {
                reason: choice.finish_reason.unwrap_or_else(|| "Unknown reason".to_string()),
            },
        }
    }
}

// ── Provider implementations ───────────────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");
        let mut results = self.embed_batch(&[text], mode).await?;
        Ok(results.pop().unwrap_or_default())
    }

    #[instrument(skip_all, fields(provider = PROVIDER, batch_size = texts.len()))]
    async fn embed_batch(&self, texts: &[&str], _mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.embedding_model, "embedding batch");

        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };
        let url = format!("{}/embeddings", self.base_url);
        let request = self.client.post(&url).bearer_auth(&self.api_key).json(&body);
        let response: EmbeddingResponse = http::send_json(&url, request).await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "embedding request failed");
            RagError::EmbeddingError { provider: PROVIDER.into(), message: e.to_string() }
        })?;

        Ok(response.into_vectors())
    }
}

#[async_trait]
impl GenerationProvider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip_all, fields(provider = PROVIDER, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<Generation> {
        debug!(model = %self.chat_model, "requesting chat completion");
        let body = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.client.post(&url).bearer_auth(&self.api_key).json(&body);
        let response: ChatResponse = http::send_json(&url, request).await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "chat completion failed");
            RagError::GenerationError { provider: PROVIDER.into(), message: e.to_string() }
        })?;
        Ok(response.into_generation())
    }
}

impl std::fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("base_url", &self.base_url)
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .finish_non_exhaustive()
    }
}
