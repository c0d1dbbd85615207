//! Ordered chunk storage with stable ids.
//!
//! [`ChunkStore`] owns no search logic. It keeps chunks in insertion order,
//! guarantees id uniqueness, and answers id lookups.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::document::{Chunk, ChunkRecord};
use crate::error::{RagError, Result};

/// Append-only, ordered collection of chunks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
    positions: HashMap<String, usize>,
}

/// Summary statistics over a set of chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreStats {
    /// Number of chunks.
    pub total_chunks: usize,
    /// Mean content length in characters.
    pub avg_chunk_length: f64,
    /// Shortest content length in characters.
    pub min_chunk_length: usize,
    /// Longest content length in characters.
    pub max_chunk_length: usize,
    /// Number of distinct source titles.
    pub unique_sources: usize,
    /// Distinct source titles, sorted.
    pub sources: Vec<String>,
}

impl ChunkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-constructed chunks.
    ///
    /// # Errors
    ///
    /// Fails on the first chunk that violates the chunk invariants or
    /// repeats an earlier id.
    pub fn from_chunks(chunks: impl IntoIterator<Item = Chunk>) -> Result<Self> {
        let mut store = Self::new();
        for chunk in chunks {
            store.push(chunk)?;
        }
        Ok(store)
    }

    /// Build a store from ingestion records, deriving ids.
    pub fn from_records(records: impl IntoIterator<Item = ChunkRecord>) -> Result<Self> {
        let mut store = Self::new();
        for record in records {
            store.push(Chunk::from_record(record)?)?;
        }
        Ok(store)
    }

    /// Load the processed chunk file written by the ingestion pipeline.
    ///
    /// The file is a JSON array of [`ChunkRecord`]s.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotFound`] if the file does not exist
    /// - [`RagError::Corrupt`] if it cannot be read or parsed
    /// - [`RagError::InvalidChunk`] / [`RagError::DuplicateChunk`] on bad records
    pub fn load_json(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RagError::NotFound { path: path.to_path_buf() });
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read chunk file");
                return Err(RagError::corrupt(path, format!("unreadable chunk file: {e}")));
            }
        };

        let records: Vec<ChunkRecord> = serde_json::from_str(&data).map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to parse chunk file");
            RagError::corrupt(path, format!("malformed chunk file: {e}"))
        })?;

        let store = Self::from_records(records)?;
        info!(path = %path.display(), chunk_count = store.len(), "loaded chunks");
        Ok(store)
    }

    /// Append a chunk and return its position.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DuplicateChunk`] if the id is already present, or
    /// [`RagError::InvalidChunk`] if the chunk violates its invariants.
    pub fn push(&mut self, chunk: Chunk) -> Result<usize> {
        chunk.validate()?;
        if self.positions.contains_key(&chunk.id) {
            return Err(RagError::DuplicateChunk(chunk.id));
        }
        let position = self.chunks.len();
        self.positions.insert(chunk.id.clone(), position);
        self.chunks.push(chunk);
        Ok(position)
    }

    /// Whether a chunk with this id is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Look up a chunk by id.
    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.positions.get(id).map(|&position| &self.chunks[position])
    }

    /// Look up a chunk by insertion position.
    pub fn at(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    /// Position of the chunk with this id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    /// Chunks in insertion order, as a slice.
    pub fn as_slice(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Compute length and source statistics.
    pub fn stats(&self) -> StoreStats {
        if self.chunks.is_empty() {
            return StoreStats::default();
        }

        let lengths: Vec<usize> = self.chunks.iter().map(Chunk::char_count).collect();
        let sources: BTreeSet<&str> = self.chunks.iter().map(|c| c.source_title.as_str()).collect();

        StoreStats {
            total_chunks: self.chunks.len(),
            avg_chunk_length: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
            min_chunk_length: lengths.iter().copied().min().unwrap_or(0),
            max_chunk_length: lengths.iter().copied().max().unwrap_or(0),
            unique_sources: sources.len(),
            sources: sources.into_iter().map(str::to_string).collect(),
        }
    }
}
