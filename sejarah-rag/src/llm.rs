//! Language model boundary.

use async_trait::async_trait;

use crate::error::Result;

/// An opaque text generator that answers an assembled prompt.
///
/// Implementations report failures as [`RagError::ExternalService`];
/// [`RagChain`](crate::RagChain) turns them into a readable answer instead of
/// propagating them.
///
/// [`RagError::ExternalService`]: crate::RagError::ExternalService
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model name, for logs and reports.
    fn model_id(&self) -> &str;
}
