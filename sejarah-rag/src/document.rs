//! Data types for chunks, search results, and retrieved context.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// One chunk as produced by the external ingestion and chunking pipeline.
///
/// Extra fields present in the ingestion file (such as a precomputed
/// `chunk_id` or `char_count`) are ignored; the id is always re-derived
/// with [`chunk_id`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    /// The chunk text.
    pub content: String,
    /// Title of the source document.
    pub source_title: String,
    /// Where the source document came from.
    pub source_url: String,
    /// Kind of source (e.g. `Wikipedia`).
    pub source_type: String,
    /// Position of this chunk within its source document.
    pub chunk_index: usize,
    /// Number of chunks the source document was split into.
    pub total_chunks: usize,
}

/// An immutable fragment of a source document, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Identifier, unique within a store.
    pub id: String,
    /// The chunk text. Never empty.
    pub content: String,
    /// Title of the source document.
    pub source_title: String,
    /// Where the source document came from.
    pub source_url: String,
    /// Kind of source.
    pub source_type: String,
    /// Position within the source document.
    pub chunk_index: usize,
    /// Number of chunks in the source document.
    pub total_chunks: usize,
}

/// Turn a source title into the id prefix shared by its chunks.
fn title_slug(title: &str) -> String {
    title.to_lowercase().replace(' ', "_")
}

/// Derive the chunk id for a chunk of `source_title` at `chunk_index`.
///
/// ```
/// assert_eq!(sejarah_rag::chunk_id("Budi Utomo", 2), "budi_utomo_chunk_2");
/// ```
pub fn chunk_id(source_title: &str, chunk_index: usize) -> String {
    format!("{}_chunk_{chunk_index}", title_slug(source_title))
}

/// Derive the id of a document added by hand through `add_document`.
pub fn custom_chunk_id(title: &str) -> String {
    format!("{}_custom", title_slug(title))
}

impl Chunk {
    /// Create a chunk from an ingestion record, deriving its id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidChunk`] if the content is empty or
    /// `chunk_index >= total_chunks`.
    pub fn from_record(record: ChunkRecord) -> Result<Self> {
        let chunk = Self {
            id: chunk_id(&record.source_title, record.chunk_index),
            content: record.content,
            source_title: record.source_title,
            source_url: record.source_url,
            source_type: record.source_type,
            chunk_index: record.chunk_index,
            total_chunks: record.total_chunks,
        };
        chunk.validate()?;
        Ok(chunk)
    }

    /// Check the chunk invariants.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RagError::InvalidChunk("chunk id must not be empty".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(RagError::InvalidChunk(format!("chunk '{}' has empty content", self.id)));
        }
        if self.chunk_index >= self.total_chunks {
            return Err(RagError::InvalidChunk(format!(
                "chunk '{}' has chunk_index {} but total_chunks {}",
                self.id, self.chunk_index, self.total_chunks
            )));
        }
        Ok(())
    }

    /// Length of the content in characters.
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// One ranked match from a vector search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// Id of the matched chunk.
    pub chunk_id: String,
    /// Insertion position of the chunk in the index.
    pub position: usize,
    /// Inner product between the query and the chunk embedding.
    pub score: f32,
    /// 1-based rank within the returned list.
    pub rank: usize,
}

/// A [`SearchResult`] together with a copy of the matched chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// The ranking information.
    pub result: SearchResult,
    /// The matched chunk.
    pub chunk: Chunk,
}

/// One chunk accepted into a [`RetrievedContext`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextPart {
    /// Chunk content prefixed with its source marker.
    pub content: String,
    /// The score the chunk was ranked with.
    pub score: f32,
    /// Title of the chunk's source document.
    pub source_title: String,
    /// Id of the chunk.
    pub chunk_id: String,
}

/// Bounded, deduplicated context assembled for one query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedContext {
    /// Accepted parts joined by the context separator.
    pub assembled_text: String,
    /// Accepted parts in rank order.
    pub parts: Vec<ContextPart>,
    /// Length of `assembled_text` in characters.
    pub total_length: usize,
    /// Source titles of the accepted parts, in first-seen order.
    pub distinct_sources: IndexSet<String>,
    /// Number of accepted parts.
    pub chunk_count: usize,
    /// Mean score of the accepted parts, 0 when there are none.
    pub average_score: f32,
    /// The character budget the context was packed against.
    pub max_context_length: usize,
}

impl RetrievedContext {
    /// A context with no parts, packed against `max_context_length`.
    pub fn empty(max_context_length: usize) -> Self {
        Self {
            assembled_text: String::new(),
            parts: Vec::new(),
            total_length: 0,
            distinct_sources: IndexSet::new(),
            chunk_count: 0,
            average_score: 0.0,
            max_context_length,
        }
    }

    /// Whether no chunk made it into the context.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// A source document judged relevant to a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    /// Title of the source document.
    pub title: String,
    /// Where the source document came from.
    pub url: String,
    /// Score of the best-ranked chunk from this source.
    pub relevance_score: f32,
    /// Kind of source.
    pub source_type: String,
}
