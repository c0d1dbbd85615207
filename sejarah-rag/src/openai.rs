//! OpenAI-compatible HTTP backends for embeddings and answer generation.
//!
//! This module is only available when the `openai` feature is enabled. Both
//! types speak the OpenAI wire format, which is also served by Groq, local
//! inference servers and most hosted gateways, so the endpoint is always
//! configurable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::LlmConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::Generator;

/// The default embeddings endpoint.
pub const DEFAULT_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible `/v1/embeddings`
/// endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use sejarah_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("http://localhost:8080/v1/embeddings")
///     .with_api_key("sk-...")
///     .with_model("intfloat/multilingual-e5-small", 384);
/// let embedding = provider.embed("Bung Hatta").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider for the endpoint at `url` with the default model.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: None,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
        }
    }

    /// Send `api_key` as a bearer token. Empty keys are ignored.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.is_empty()).then_some(api_key);
        self
    }

    /// Use `model`, which produces vectors of `dimensions` components.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
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
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// POST `body` as JSON and decode a successful response as `R`.
async fn post_json<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    service: &str,
    url: &str,
    api_key: Option<&str>,
    body: &B,
) -> Result<R> {
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request.send().await.map_err(|e| {
        error!(service, error = %e, "request failed");
        RagError::external(service, format!("request failed: {e}"))
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);

        error!(service, %status, "API error");
        return Err(RagError::external(service, format!("API returned {status}: {detail}")));
    }

    response.json().await.map_err(|e| {
        error!(service, error = %e, "failed to parse response");
        RagError::external(service, format!("failed to parse response: {e}"))
    })
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::external("embedding", "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body = EmbeddingRequest { model: &self.model, input: texts };
        let mut response: EmbeddingResponse =
            post_json(&self.client, "embedding", &self.url, self.api_key.as_deref(), &request_body)
                .await?;

        if response.data.len() != texts.len() {
            return Err(RagError::external(
                "embedding",
                format!("API returned {} embeddings for {} inputs", response.data.len(), texts.len()),
            ));
        }
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// A [`Generator`] backed by an OpenAI-compatible chat-completions endpoint.
///
/// Sends the configured system prompt followed by the assembled prompt as a
/// single user message.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatCompletionsGenerator {
    /// Create a generator from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if no API key is configured.
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(RagError::ConfigError("an LLM API key is required".to_string()));
        }
        Ok(Self { client: reqwest::Client::new(), config })
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.config.model, prompt_len = prompt.len(), "requesting completion");
        let request_body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage { role: "system", content: &self.config.system_prompt },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let response: ChatResponse = post_json(
            &self.client,
            "llm",
            &self.config.api_url,
            self.config.api_key.as_deref(),
            &request_body,
        )
        .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| RagError::external("llm", "API returned no completion"))
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}
