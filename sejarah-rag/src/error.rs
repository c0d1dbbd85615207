//! Error types for the `sejarah-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, persisting, or querying the index.
#[derive(Debug, Error)]
pub enum RagError {
    /// An index was requested from zero chunks.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A persisted index was requested but its artifacts do not exist.
    ///
    /// Callers may recover by building a fresh index.
    #[error("Index not found at {}", path.display())]
    NotFound {
        /// The index location that was checked.
        path: PathBuf,
    },

    /// Persisted artifacts exist but fail structural validation.
    #[error("Corrupt index at {}: {message}", path.display())]
    Corrupt {
        /// The artifact or index directory that failed validation.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// The index was built with a different embedding model than the one in use.
    #[error("Embedding model mismatch: index built with '{found}', embedder uses '{expected}'")]
    ModelMismatch {
        /// The model identifier of the embedder in use.
        expected: String,
        /// The model identifier recorded in the index.
        found: String,
    },

    /// An external dependency (embedder or language model) failed.
    #[error("External service error ({service}): {message}")]
    ExternalService {
        /// The service that produced the error.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// An embedding vector could not be used (zero norm, NaN, empty).
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// An embedding or query vector has the wrong number of components.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension fixed when the index was created.
        expected: usize,
        /// The dimension that was supplied.
        actual: usize,
    },

    /// A chunk with this id is already stored.
    #[error("Duplicate chunk id: {0}")]
    DuplicateChunk(String),

    /// A chunk record violates the chunk invariants.
    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    /// Writing index artifacts failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The path being written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RagError {
    pub(crate) fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService { service: service.into(), message: message.into() }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupt { path: path.into(), message: message.into() }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Whether a fresh build is an acceptable recovery for this error.
    pub fn is_recoverable_by_rebuild(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
