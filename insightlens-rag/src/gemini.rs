//! Gemini embedding and generation provider over the Generative Language
//! REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::embedding::{EmbedMode, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{Generation, GenerationProvider};
use crate::http::{self, DEFAULT_TIMEOUT};

const PROVIDER: &str = "Gemini";

/// The public Generative Language API endpoint.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";

/// Default generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "models/gemini-2.0-flash";

/// Environment variables checked, in order, by [`GeminiProvider::from_env`].
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

const UNKNOWN_BLOCK_REASON: &str = "Unknown reason";

/// An [`EmbeddingProvider`] and [`GenerationProvider`] backed by Gemini.
///
/// Documents are embedded with task type `RETRIEVAL_DOCUMENT` and queries
/// with `RETRIEVAL_QUERY`.
///
/// # Example
///
/// ```rust,ignore
/// use insightlens_rag::gemini::GeminiProvider;
///
/// let provider = GeminiProvider::from_env()?.with_timeout(Duration::from_secs(30))?;
/// let embedding = provider.embed("hello world", EmbedMode::Query).await?;
/// ```
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
    generation_model: String,
}

impl GeminiProvider {
    /// Create a provider with the default models and request timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("Gemini API key must not be empty".to_string()));
        }
        let client = client(&api_key, DEFAULT_TIMEOUT)?;
        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_API_BASE.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
        })
    }

    /// Create a provider from `GEMINI_API_KEY`, falling back to
    /// `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                RagError::ConfigError(format!(
                    "no Gemini API key found; set {} or {}",
                    API_KEY_VARS[0], API_KEY_VARS[1]
                ))
            })?;
        Self::new(api_key)
    }

    /// Replace the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = client(&self.api_key, timeout)?;
        Ok(self)
    }

    /// Point the provider at another endpoint, e.g. a proxy or a test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the embedding model. A `models/` prefix is added if missing.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model_path(model.into());
        self
    }

    /// Set the generation model. A `models/` prefix is added if missing.
    pub fn with_generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = model_path(model.into());
        self
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/{model}:{method}", self.base_url)
    }
}

fn client(api_key: &str, timeout: Duration) -> Result<Client> {
    let value = HeaderValue::from_str(api_key).map_err(|e| {
        RagError::ConfigError(format!("Gemini API key is not a valid header value: {e}"))
    })?;
    let headers = HeaderMap::from_iter([(HeaderName::from_static("x-goog-api-key"), value)]);
    http::build_client(timeout, headers).map_err(|e| RagError::ConfigError(e.to_string()))
}

fn model_path(model: String) -> String {
    if model.starts_with("models/") { model } else { format!("models/{model}") }
}

fn embedding_error(e: &dyn std::fmt::Display) -> RagError {
    error!(provider = PROVIDER, error = %e, "embedding request failed");
    RagError::EmbeddingError { provider: PROVIDER.into(), message: e.to_string() }
}

fn generation_error(e: &dyn std::fmt::Display) -> RagError {
    error!(provider = PROVIDER, error = %e, "generation request failed");
    RagError::GenerationError { provider: PROVIDER.into(), message: e.to_string() }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn task_type(mode: EmbedMode) -> &'static str {
    match mode {
        EmbedMode::Document => "RETRIEVAL_DOCUMENT",
        EmbedMode::Query => "RETRIEVAL_QUERY",
    }
}

impl GenerateContentResponse {
    /// The first candidate's text, or why there is none.
    fn into_generation(self) -> Generation {
        let text: Option<String> = self
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .filter(|text: &String| !text.is_empty());

        match text {
            Some(text) => Generation::Answer(text),
            None => {
                let reason = self
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .or_else(|| self.candidates.into_iter().next().and_then(|c| c.finish_reason))
                    .unwrap_or_else(|| UNKNOWN_BLOCK_REASON.to_string());
                Generation::Blocked { reason }
            }
        }
    }
}

// ── Provider implementations ───────────────────────────────────────

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text], mode).await?;
        Ok(results.pop().unwrap_or_default())
    }

    #[instrument(skip_all, fields(provider = PROVIDER, batch_size = texts.len()))]
    async fn embed_batch(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.embedding_model, ?mode, "embedding batch");

        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &self.embedding_model,
                    content: Content { role: None, parts: vec![TextPart { text }] },
                    task_type: task_type(mode),
                })
                .collect(),
        };
        let url = self.url(&self.embedding_model, "batchEmbedContents");
        let response: BatchEmbedResponse = http::send_json(&url, self.client.post(&url).json(&body))
            .await
            .map_err(|e| embedding_error(&e))?;

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip_all, fields(provider = PROVIDER, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<Generation> {
        debug!(model = %self.generation_model, "generating content");
        let body = GenerateContentRequest {
            contents: vec![Content { role: Some("user"), parts: vec![TextPart { text: prompt }] }],
        };
        let url = self.url(&self.generation_model, "generateContent");
        let response: GenerateContentResponse =
            http::send_json(&url, self.client.post(&url).json(&body))
                .await
                .map_err(|e| generation_error(&e))?;
        Ok(response.into_generation())
    }
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("embedding_model", &self.embedding_model)
            .field("generation_model", &self.generation_model)
            .finish_non_exhaustive()
    }
}
