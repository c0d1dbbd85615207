//! The searchable vector index: chunks, their embeddings, and the model id.
//!
//! [`VectorIndex`] keeps a [`ChunkStore`] and a [`FlatIndex`] side by side
//! under one `tokio::sync::RwLock`, so position `i` in the flat index is
//! always the chunk at position `i` in the store. Searches take the read
//! lock and run concurrently; additions and reloads take the write lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use sejarah_rag::{ChunkStore, VectorIndex};
//!
//! let chunks = ChunkStore::load_json(Path::new("data/processed/text_chunks.json"))?;
//! let index = VectorIndex::build(chunks.as_slice().to_vec(), &embedder, 32).await?;
//! index.persist(Path::new("data/vector_db")).await?;
//!
//! let restored = VectorIndex::restore(Path::new("data/vector_db"), embedder.model_id()).await?;
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use crate::document::{Chunk, SearchHit, SearchResult, custom_chunk_id};
use crate::embedding::{EmbeddingProvider, normalize_in_place, normalized};
use crate::error::{RagError, Result};
use crate::flat::FlatIndex;
use crate::persist;
use crate::store::{ChunkStore, StoreStats};

/// Source URL recorded for documents added through [`VectorIndex::add_document`].
pub const CUSTOM_SOURCE_URL: &str = "Custom Input";

#[derive(Debug)]
struct IndexState {
    model: String,
    chunks: ChunkStore,
    /// `None` until the first embedding fixes the dimension.
    vectors: Option<FlatIndex>,
}

impl IndexState {
    fn dimension(&self) -> Option<usize> {
        self.vectors.as_ref().map(FlatIndex::dimension)
    }
}

/// Statistics about an index and the chunks it holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    /// Chunk length and source statistics.
    #[serde(flatten)]
    pub store: StoreStats,
    /// Vector dimension, 0 before the first vector is added.
    pub embedding_dimension: usize,
    /// Number of stored vectors.
    pub index_size: usize,
    /// Embedding model the vectors were produced with.
    pub model: String,
}

/// Exact inner-product index over unit-normalized chunk embeddings.
#[derive(Debug)]
pub struct VectorIndex {
    state: RwLock<IndexState>,
    /// Serializes whole persists so two writers never race on one directory.
    persist_lock: Mutex<()>,
}

impl VectorIndex {
    fn from_state(state: IndexState) -> Self {
        Self { state: RwLock::new(state), persist_lock: Mutex::new(()) }
    }

    /// An index with no chunks, whose dimension is fixed by the first add.
    pub fn empty(model: impl Into<String>) -> Self {
        Self::from_state(IndexState { model: model.into(), chunks: ChunkStore::new(), vectors: None })
    }

    /// Embed `chunks` in batches of `batch_size` and index them in order.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyInput`] if `chunks` is empty
    /// - [`RagError::InvalidChunk`] / [`RagError::DuplicateChunk`] before any
    ///   embedding call is made
    /// - [`RagError::ExternalService`] if the embedder fails or returns the
    ///   wrong number of vectors
    /// - [`RagError::InvalidEmbedding`] / [`RagError::DimensionMismatch`] for
    ///   unusable vectors
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::EmptyInput("cannot build an index from zero chunks".to_string()));
        }
        let store = ChunkStore::from_chunks(chunks)?;
        let batch_size = batch_size.max(1);

        let mut vectors: Option<FlatIndex> = None;
        for (batch_number, batch) in store.as_slice().chunks(batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let embeddings = embedder.embed_batch(&texts).await.map_err(|e| {
                error!(batch = batch_number, error = %e, "embedding failed during index build");
                e
            })?;
            if embeddings.len() != texts.len() {
                return Err(RagError::external(
                    "embedding",
                    format!("returned {} embeddings for {} texts", embeddings.len(), texts.len()),
                ));
            }
            for mut embedding in embeddings {
                normalize_in_place(&mut embedding)?;
                vectors.get_or_insert_with(|| FlatIndex::new(embedding.len())).push(&embedding)?;
            }
        }

        let state = IndexState { model: embedder.model_id().to_string(), chunks: store, vectors };
        info!(
            chunk_count = state.chunks.len(),
            dimension = state.dimension().unwrap_or(0),
            model = %state.model,
            "built vector index"
        );
        Ok(Self::from_state(state))
    }

    /// Index chunks whose embeddings were computed elsewhere.
    ///
    /// Embeddings are normalized; `embeddings[i]` belongs to `chunks[i]`.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build), plus [`RagError::InvalidChunk`] when
    /// the two lists differ in length.
    pub fn from_embeddings(
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
        model: impl Into<String>,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::EmptyInput("cannot build an index from zero chunks".to_string()));
        }
        if chunks.len() != embeddings.len() {
            return Err(RagError::InvalidChunk(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        let store = ChunkStore::from_chunks(chunks)?;
        let mut vectors: Option<FlatIndex> = None;
        for embedding in embeddings {
            let embedding = normalized(embedding)?;
            vectors.get_or_insert_with(|| FlatIndex::new(embedding.len())).push(&embedding)?;
        }
        Ok(Self::from_state(IndexState { model: model.into(), chunks: store, vectors }))
    }

    /// Return up to `k` results with score at least `min_score`, ranked by
    /// descending score and then insertion order.
    ///
    /// An index with no vectors returns an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if `query` has the wrong length.
    pub async fn search(&self, query: &[f32], k: usize, min_score: f32) -> Result<Vec<SearchResult>> {
        Ok(self.search_hits(query, k, min_score).await?.into_iter().map(|hit| hit.result).collect())
    }

    /// Like [`search`](Self::search), with a copy of each matched chunk.
    pub async fn search_hits(&self, query: &[f32], k: usize, min_score: f32) -> Result<Vec<SearchHit>> {
        let state = self.state.read().await;
        let Some(vectors) = state.vectors.as_ref() else {
            return Ok(Vec::new());
        };

        let matches = vectors.search(query, k, min_score)?;
        let mut hits = Vec::with_capacity(matches.len());
        for (rank, (position, score)) in matches.into_iter().enumerate() {
            let chunk = state.chunks.at(position).ok_or_else(|| {
                RagError::InvalidChunk(format!("no chunk stored at position {position}"))
            })?;
            hits.push(SearchHit {
                result: SearchResult { chunk_id: chunk.id.clone(), position, score, rank: rank + 1 },
                chunk: chunk.clone(),
            });
        }
        Ok(hits)
    }

    /// Append one chunk with its embedding and return its position.
    ///
    /// The embedding is normalized before it is stored. On error the index
    /// is left unchanged.
    pub async fn add(&self, chunk: Chunk, embedding: Vec<f32>) -> Result<usize> {
        chunk.validate()?;
        let embedding = normalized(embedding)?;

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if state.chunks.contains(&chunk.id) {
            return Err(RagError::DuplicateChunk(chunk.id));
        }
        if let Some(dimension) = state.dimension() {
            if dimension != embedding.len() {
                return Err(RagError::DimensionMismatch { expected: dimension, actual: embedding.len() });
            }
        }

        let id = chunk.id.clone();
        let position = state.chunks.push(chunk)?;
        state.vectors.get_or_insert_with(|| FlatIndex::new(embedding.len())).push(&embedding)?;
        info!(chunk.id = %id, position, "added chunk to index");
        Ok(position)
    }

    /// Embed `chunk` with `embedder` and append it.
    ///
    /// The chunk and the embedder's model are checked before the embedder
    /// is called.
    ///
    /// # Errors
    ///
    /// [`RagError::ModelMismatch`] if `embedder` is not the model this index
    /// was built with, plus the errors of [`add`](Self::add).
    pub async fn add_embedded(&self, chunk: Chunk, embedder: &dyn EmbeddingProvider) -> Result<usize> {
        chunk.validate()?;
        self.ensure_model(embedder.model_id()).await?;
        let embedding = embedder.embed(&chunk.content).await.map_err(|e| {
            error!(chunk.id = %chunk.id, error = %e, "embedding failed while adding chunk");
            e
        })?;
        self.add(chunk, embedding).await
    }

    /// Add a hand-written document as a single chunk.
    ///
    /// The chunk id is derived from the title with a `_custom` suffix and
    /// the source URL is [`CUSTOM_SOURCE_URL`].
    pub async fn add_document(
        &self,
        title: &str,
        content: &str,
        source_type: &str,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<usize> {
        let chunk = Chunk {
            id: custom_chunk_id(title),
            content: content.to_string(),
            source_title: title.to_string(),
            source_url: CUSTOM_SOURCE_URL.to_string(),
            source_type: source_type.to_string(),
            chunk_index: 0,
            total_chunks: 1,
        };
        self.add_embedded(chunk, embedder).await
    }

    /// Write the index to the directory at `path`, replacing any index there.
    ///
    /// Readers of `path` observe either the previous index or this one.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyInput`] if the index holds no chunks
    /// - [`RagError::Io`] if the artifacts cannot be written
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let _writer = self.persist_lock.lock().await;
        let (artifacts, count) = {
            let state = self.state.read().await;
            let vectors = state
                .vectors
                .as_ref()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| RagError::EmptyInput("cannot persist an index with no chunks".to_string()))?;
            (persist::encode(&state.model, vectors, state.chunks.as_slice())?, state.chunks.len())
        };

        let target = path.to_path_buf();
        run_blocking(path, move || persist::write_atomic(&target, &artifacts)).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to persist index");
            e
        })?;
        info!(path = %path.display(), chunk_count = count, "persisted vector index");
        Ok(())
    }

    /// Load an index persisted at `path` and check it was built with `model`.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotFound`] if no index exists at `path`
    /// - [`RagError::Corrupt`] if the artifacts are incomplete or inconsistent
    /// - [`RagError::ModelMismatch`] if the recorded model is not `model`
    pub async fn restore(path: &Path, model: &str) -> Result<Self> {
        let dir = path.to_path_buf();
        let restored = run_blocking(path, move || persist::read(&dir)).await?;
        if restored.model != model {
            return Err(RagError::ModelMismatch {
                expected: model.to_string(),
                found: restored.model,
            });
        }

        let state =
            IndexState { model: restored.model, chunks: restored.chunks, vectors: Some(restored.vectors) };
        info!(
            path = %path.display(),
            chunk_count = state.chunks.len(),
            dimension = state.dimension().unwrap_or(0),
            "restored vector index"
        );
        Ok(Self::from_state(state))
    }

    /// Replace this index's contents with the index persisted at `path`.
    ///
    /// On error the current contents are kept.
    pub async fn reload(&self, path: &Path, model: &str) -> Result<()> {
        let fresh = Self::restore(path, model).await?.state.into_inner();
        *self.state.write().await = fresh;
        Ok(())
    }

    /// Check that vectors from `model` can be mixed with this index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelMismatch`] if the index was built with
    /// another model.
    pub async fn ensure_model(&self, model: &str) -> Result<()> {
        let state = self.state.read().await;
        if state.model != model {
            return Err(RagError::ModelMismatch { expected: model.to_string(), found: state.model.clone() });
        }
        Ok(())
    }

    /// Number of indexed chunks.
    pub async fn len(&self) -> usize {
        self.state.read().await.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.chunks.is_empty()
    }

    /// Vector dimension, once known.
    pub async fn dimension(&self) -> Option<usize> {
        self.state.read().await.dimension()
    }

    /// Embedding model the index was built with.
    pub async fn model(&self) -> String {
        self.state.read().await.model.clone()
    }

    /// A copy of the chunk with this id.
    pub async fn chunk(&self, id: &str) -> Option<Chunk> {
        self.state.read().await.chunks.get(id).cloned()
    }

    /// Copies of all chunks in index order.
    pub async fn chunks(&self) -> Vec<Chunk> {
        self.state.read().await.chunks.as_slice().to_vec()
    }

    /// Copies of all stored (normalized) embeddings in index order.
    pub async fn embeddings(&self) -> Vec<Vec<f32>> {
        let state = self.state.read().await;
        state.vectors.as_ref().map(|v| v.rows().map(<[f32]>::to_vec).collect()).unwrap_or_default()
    }

    /// Chunk statistics plus index dimension, size and model.
    pub async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        IndexStats {
            store: state.chunks.stats(),
            embedding_dimension: state.dimension().unwrap_or(0),
            index_size: state.vectors.as_ref().map_or(0, FlatIndex::len),
            model: state.model.clone(),
        }
    }
}

/// Run blocking filesystem work off the async executor.
async fn run_blocking<T, F>(path: &Path, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RagError::io(path, std::io::Error::other(e)))?
}
