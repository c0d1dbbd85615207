//! Exact inner-product search over a contiguous buffer of unit vectors.

use std::cmp::Ordering;

use crate::embedding::dot;
use crate::error::{RagError, Result};

/// Flat (brute-force) vector index.
///
/// Rows are stored back to back in one `Vec<f32>`; row `i` is the embedding
/// of the chunk at insertion position `i`. Every search scans every row, so
/// the returned top-k is exact.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self { dimension, data: Vec::new() }
    }

    /// Rebuild an index from a flat row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if `data.len()` is not a
    /// multiple of `dimension`.
    pub fn from_raw(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: if dimension == 0 { data.len() } else { data.len() % dimension },
            });
        }
        Ok(Self { dimension, data })
    }

    /// Vector dimension fixed at creation.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        if self.dimension == 0 { 0 } else { self.data.len() / self.dimension }
    }

    /// Whether no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append one row and return its position.
    pub fn push(&mut self, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    /// Row at `position`.
    pub fn row(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.max(1))
    }

    /// The raw row-major buffer.
    pub fn as_raw(&self) -> &[f32] {
        &self.data
    }

    /// Return up to `k` `(position, score)` pairs with `score >= min_score`,
    /// by descending score, ties broken by ascending position.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the query has the wrong
    /// length and the index is not empty.
    pub fn search(&self, query: &[f32], k: usize, min_score: f32) -> Result<Vec<(usize, f32)>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .rows()
            .enumerate()
            .map(|(position, row)| (position, dot(query, row)))
            .filter(|&(_, score)| score >= min_score)
            .collect();

        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, rank_order);
            scored.truncate(k);
        }
        scored.sort_unstable_by(rank_order);
        Ok(scored)
    }
}

/// Descending score, then ascending position.
///
/// Positions are unique, so this is a total order and the unstable sort and
/// selection above yield the same result as a stable sort by score.
fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}
