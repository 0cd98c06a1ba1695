//! Generation provider trait for producing answers and summaries from a
//! prompt.

use async_trait::async_trait;

use crate::error::Result;

/// The outcome of a successful generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    /// The model's text.
    Answer(String),
    /// The provider refused to answer on safety grounds.
    Blocked {
        /// Provider-supplied reason, or `"Unknown reason"`.
        reason: String,
    },
}

impl Generation {
    /// The answer text, if the call was not blocked.
    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Answer(text) => Some(text),
            Self::Blocked { .. } => None,
        }
    }
}

/// A provider that turns a prompt into model output.
///
/// Transport and API failures are
/// [`RagError::GenerationError`](crate::RagError::GenerationError). A safety
/// refusal is not an error: it is reported as [`Generation::Blocked`] so
/// callers can tell the user why nothing was produced.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Short provider name used in errors and logs.
    fn name(&self) -> &str;

    /// Send `prompt` to the model.
    async fn generate(&self, prompt: &str) -> Result<Generation>;
}
