//! Configuration for retrieval and generation.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Retrieval parameters shared by the index build and the retriever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Number of chunks kept after merging all query variants.
    pub top_k: usize,
    /// Minimum inner-product score for a chunk to be considered at all.
    pub min_score: f32,
    /// Maximum length of the assembled context, in characters.
    pub max_context_length: usize,
    /// Number of texts sent to the embedder per batch while building.
    pub embed_batch_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { top_k: 3, min_score: 0.2, max_context_length: 3000, embed_batch_size: 32 }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `top_k == 0`
    /// - `min_score` is outside `[-1.0, 1.0]` or not a number
    /// - `max_context_length == 0`
    /// - `embed_batch_size == 0`
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if !(-1.0..=1.0).contains(&self.min_score) {
            return Err(RagError::ConfigError(format!(
                "min_score ({}) must be within [-1.0, 1.0]",
                self.min_score
            )));
        }
        if self.max_context_length == 0 {
            return Err(RagError::ConfigError(
                "max_context_length must be greater than zero".to_string(),
            ));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the number of chunks returned after merging.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity score.
    pub fn min_score(mut self, score: f32) -> Self {
        self.config.min_score = score;
        self
    }

    /// Set the context budget in characters.
    pub fn max_context_length(mut self, length: usize) -> Self {
        self.config.max_context_length = length;
        self
    }

    /// Set the embedding batch size used during index builds.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Default chat-completions endpoint (Groq, OpenAI-compatible).
pub const DEFAULT_LLM_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default chat model.
pub const DEFAULT_LLM_MODEL: &str = "llama3-8b-8192";

/// Settings for the answer-generating language model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Full URL of the chat-completions endpoint.
    pub api_url: String,
    /// Model name sent with each request.
    pub model: String,
    /// Bearer token. Never serialized.
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// System message sent ahead of the assembled prompt.
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_LLM_API_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
            max_tokens: 500,
            temperature: 0.1,
            system_prompt: "Anda adalah asisten AI yang ahli dalam sejarah kemerdekaan Indonesia. \
                            Jawab pertanyaan berdasarkan konteks yang diberikan dengan akurat dan \
                            informatif."
                .to_string(),
        }
    }
}
