//! Query-time orchestration: expand, search, merge, rank, pack.
//!
//! The [`Retriever`] composes a shared [`VectorIndex`], an
//! [`EmbeddingProvider`] and a [`QueryExpander`]. It holds no per-query
//! state, so one retriever can serve concurrent queries.
//!
//! # Example
//!
//! ```rust,ignore
//! use sejarah_rag::{RagConfig, Retriever};
//!
//! let retriever = Retriever::builder()
//!     .config(RagConfig::default())
//!     .index(index)
//!     .embedding_provider(embedder)
//!     .build()?;
//!
//! let context = retriever.retrieve("Kapan proklamasi dibacakan?").await?;
//! let report = retriever.evaluate(&context);
//! ```

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, error};

use crate::config::RagConfig;
use crate::document::{ContextPart, RetrievedContext, SearchHit, SourceRef};
use crate::embedding::{EmbeddingProvider, normalized};
use crate::error::{RagError, Result};
use crate::expansion::QueryExpander;
use crate::index::VectorIndex;
use crate::quality::{QualityReport, evaluate};
use crate::text::clean;

/// Joins accepted context parts in `assembled_text`.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Minimum score for [`Retriever::relevant_sources`], independent of the
/// retrieval threshold.
pub const SOURCE_MIN_SCORE: f32 = 0.1;

/// Prefix a chunk's content with its source marker.
pub fn format_part(source_title: &str, content: &str) -> String {
    format!("[Source: {source_title}]\n{content}")
}

/// Turns a question into a bounded, deduplicated [`RetrievedContext`].
pub struct Retriever {
    config: RagConfig,
    index: Arc<VectorIndex>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    expander: QueryExpander,
}

impl Retriever {
    /// Create a new [`RetrieverBuilder`].
    pub fn builder() -> RetrieverBuilder {
        RetrieverBuilder::default()
    }

    /// The retrieval configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The shared index searched by this retriever.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// The embedding provider used for queries.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Retrieve with the configured `top_k`, `min_score` and budget.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievedContext> {
        self.retrieve_with(
            query,
            self.config.top_k,
            self.config.min_score,
            self.config.max_context_length,
        )
        .await
    }

    /// Retrieve context for `query`.
    ///
    /// Each expanded variant is embedded and searched with `k` and
    /// `min_score`. Results are merged by chunk id (first occurrence wins),
    /// re-ranked by score, cut to `k`, and packed greedily so that the
    /// assembled text, separators included, never exceeds
    /// `max_context_length` characters. A candidate that does not fit is
    /// skipped, never truncated.
    ///
    /// Finding nothing is not an error: the returned context is empty.
    ///
    /// # Errors
    ///
    /// - [`RagError::ModelMismatch`] if the index was built with another
    ///   embedding model, checked before the embedder is called
    /// - [`RagError::ExternalService`] if the embedder fails
    /// - [`RagError::DimensionMismatch`] if its vectors do not fit the index
    pub async fn retrieve_with(
        &self,
        query: &str,
        k: usize,
        min_score: f32,
        max_context_length: usize,
    ) -> Result<RetrievedContext> {
        let variants = self.expander.expand(query);
        if variants.is_empty() || k == 0 {
            return Ok(RetrievedContext::empty(max_context_length));
        }
        debug!(?variants, "searching query variants");

        let embeddings = self.embed_queries(&variants).await?;
        let mut merged: IndexMap<String, SearchHit> = IndexMap::new();
        for embedding in &embeddings {
            for hit in self.index.search_hits(embedding, k, min_score).await? {
                merged.entry(hit.result.chunk_id.clone()).or_insert(hit);
            }
        }

        let mut ranked: Vec<SearchHit> = merged.into_values().collect();
        ranked.sort_by(|a, b| b.result.score.total_cmp(&a.result.score));
        ranked.truncate(k);
        debug!(candidate_count = ranked.len(), "merged variant results");

        Ok(pack(ranked, max_context_length))
    }

    /// Classify the quality of a retrieved context.
    pub fn evaluate(&self, context: &RetrievedContext) -> QualityReport {
        evaluate(context)
    }

    /// Sources of the top `k` chunks for the cleaned query (no expansion),
    /// one entry per source title in rank order.
    ///
    /// Chunks are kept down to [`SOURCE_MIN_SCORE`] rather than the
    /// configured `min_score`, so this lists sources the context may leave out.
    pub async fn relevant_sources(&self, query: &str, k: usize) -> Result<Vec<SourceRef>> {
        let cleaned = clean(query);
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.embed_queries(std::slice::from_ref(&cleaned)).await?;
        let Some(embedding) = embeddings.first() else {
            return Ok(Vec::new());
        };

        let mut seen = IndexSet::new();
        let mut sources = Vec::new();
        for hit in self.index.search_hits(embedding, k, SOURCE_MIN_SCORE).await? {
            if seen.insert(hit.chunk.source_title.clone()) {
                sources.push(SourceRef {
                    title: hit.chunk.source_title,
                    url: hit.chunk.source_url,
                    relevance_score: hit.result.score,
                    source_type: hit.chunk.source_type,
                });
            }
        }
        Ok(sources)
    }

    async fn embed_queries(&self, queries: &[String]) -> Result<Vec<Vec<f32>>> {
        self.index.ensure_model(self.embedding_provider.model_id()).await?;
        let texts: Vec<&str> = queries.iter().map(String::as_str).collect();
        let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            error!(error = %e, "embedding failed during retrieval");
            e
        })?;
        if embeddings.len() != texts.len() {
            return Err(RagError::external(
                "embedding",
                format!("returned {} embeddings for {} queries", embeddings.len(), texts.len()),
            ));
        }
        embeddings.into_iter().map(normalized).collect()
    }
}

/// Greedily pack ranked hits into a context of at most `budget` characters.
fn pack(ranked: Vec<SearchHit>, budget: usize) -> RetrievedContext {
    let separator_len = CONTEXT_SEPARATOR.chars().count();
    let mut context = RetrievedContext::empty(budget);

    for hit in ranked {
        let content = format_part(&hit.chunk.source_title, &hit.chunk.content);
        let length = content.chars().count();
        let added = if context.parts.is_empty() { length } else { length + separator_len };
        if context.total_length + added > budget {
            debug!(chunk.id = %hit.chunk.id, length, "candidate does not fit context budget");
            continue;
        }

        if !context.parts.is_empty() {
            context.assembled_text.push_str(CONTEXT_SEPARATOR);
        }
        context.assembled_text.push_str(&content);
        context.total_length += added;
        context.distinct_sources.insert(hit.chunk.source_title.clone());
        context.parts.push(ContextPart {
            content,
            score: hit.result.score,
            source_title: hit.chunk.source_title,
            chunk_id: hit.chunk.id,
        });
    }

    context.chunk_count = context.parts.len();
    if !context.parts.is_empty() {
        let sum: f32 = context.parts.iter().map(|p| p.score).sum();
        context.average_score = sum / context.parts.len() as f32;
    }
    context
}

/// Builder for constructing a [`Retriever`].
///
/// The index and embedding provider are required; the configuration
/// defaults to [`RagConfig::default`] and the expander to the built-in
/// history table.
#[derive(Default)]
pub struct RetrieverBuilder {
    config: Option<RagConfig>,
    index: Option<Arc<VectorIndex>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    expander: Option<QueryExpander>,
}

impl RetrieverBuilder {
    /// Set the retrieval configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the index to search.
    pub fn index(mut self, index: Arc<VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the embedding provider used for queries.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Replace the query expander.
    pub fn expander(mut self, expander: QueryExpander) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Build the [`Retriever`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<Retriever> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let index = self.index.ok_or_else(|| RagError::ConfigError("index is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;

        Ok(Retriever {
            config,
            index,
            embedding_provider,
            expander: self.expander.unwrap_or_default(),
        })
    }
}
