//! # sejarah-rag
//!
//! Retrieval core for question answering over Indonesian independence
//! history documents.
//!
//! ## Overview
//!
//! - [`ChunkStore`] holds the chunks produced by the ingestion pipeline.
//! - [`VectorIndex`] embeds them, answers exact top-k inner-product
//!   searches, and persists to and restores from disk as a unit.
//! - [`QueryExpander`] adds domain phrases to a cleaned query.
//! - [`Retriever`] searches every query variant, merges and ranks the
//!   results, and packs them into a [`RetrievedContext`] under a character
//!   budget. [`evaluate`] grades the result.
//! - [`PromptTemplate`] and [`RagChain`] turn a context into a prompt and an
//!   answer through a [`Generator`].
//!
//! The embedding model and the language model are external capabilities
//! behind the [`EmbeddingProvider`] and [`Generator`] traits.
//!
//! ## Features
//!
//! - `openai`: OpenAI-compatible embedding and chat-completions backends

pub mod chain;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod expansion;
pub mod flat;
pub mod index;
pub mod llm;
pub mod persist;
pub mod prompt;
pub mod quality;
pub mod retriever;
pub mod store;
pub mod text;

#[cfg(feature = "openai")]
pub mod openai;

pub use chain::{Answer, RagChain};
pub use config::{LlmConfig, RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, ChunkRecord, ContextPart, RetrievedContext, SearchHit, SearchResult, SourceRef,
    chunk_id, custom_chunk_id,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use expansion::QueryExpander;
pub use flat::FlatIndex;
pub use index::{IndexStats, VectorIndex};
pub use llm::Generator;
pub use persist::IndexMetadata;
pub use prompt::PromptTemplate;
pub use quality::{QualityIssue, QualityReport, RetrievalQuality, evaluate};
pub use retriever::{Retriever, RetrieverBuilder};
pub use store::{ChunkStore, StoreStats};
