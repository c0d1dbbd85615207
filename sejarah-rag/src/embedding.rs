//! Embedding provider boundary and vector normalization.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// Allowed deviation of an embedding's Euclidean norm from 1.
pub const NORM_TOLERANCE: f64 = 1e-6;

/// A provider that maps text to fixed-length embedding vectors.
///
/// The embedding model is an opaque external capability. Implementations
/// wrap a concrete backend (an HTTP embedding service, a local model) or, in
/// tests, a deterministic fake. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// Providers may claim to return unit vectors; callers in this crate
/// re-normalize regardless.
///
/// # Example
///
/// ```rust,ignore
/// use sejarah_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("Siapa Bung Hatta?").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Identifier of the underlying model, recorded in persisted indexes.
    fn model_id(&self) -> &str;
}

/// Euclidean norm, accumulated in `f64`.
pub fn l2_norm(vector: &[f32]) -> f64 {
    vector.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt()
}

/// Whether `vector` has unit norm within [`NORM_TOLERANCE`].
pub fn is_unit(vector: &[f32]) -> bool {
    (l2_norm(vector) - 1.0).abs() <= NORM_TOLERANCE
}

/// Scale `vector` to unit length in place.
///
/// Vectors already within tolerance are left untouched.
///
/// # Errors
///
/// Returns [`RagError::InvalidEmbedding`] for empty vectors, vectors with
/// non-finite components, and zero vectors.
pub fn normalize_in_place(vector: &mut [f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(RagError::InvalidEmbedding("embedding is empty".to_string()));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(RagError::InvalidEmbedding("embedding contains non-finite values".to_string()));
    }
    let norm = l2_norm(vector);
    if norm <= f64::from(f32::EPSILON) {
        return Err(RagError::InvalidEmbedding("embedding has zero magnitude".to_string()));
    }
    if (norm - 1.0).abs() > NORM_TOLERANCE {
        for value in vector.iter_mut() {
            *value = (f64::from(*value) / norm) as f32;
        }
    }
    Ok(())
}

/// Owned variant of [`normalize_in_place`].
pub fn normalized(mut vector: Vec<f32>) -> Result<Vec<f32>> {
    normalize_in_place(&mut vector)?;
    Ok(vector)
}

/// Inner product of two equal-length vectors.
///
/// For unit vectors this is their cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
