//! Question answering: retrieve, assemble the prompt, generate.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::document::RetrievedContext;
use crate::error::Result;
use crate::llm::Generator;
use crate::prompt::PromptTemplate;
use crate::quality::QualityReport;
use crate::retriever::Retriever;

/// Everything produced while answering one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub context: RetrievedContext,
    pub prompt: String,
    /// The generated answer, or a readable error message if generation failed.
    pub response: String,
    pub quality: QualityReport,
}

/// Composes a [`Retriever`], a [`PromptTemplate`] and a [`Generator`].
pub struct RagChain {
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
}

impl RagChain {
    /// Create a chain with the default prompt template.
    pub fn new(retriever: Arc<Retriever>, generator: Arc<dyn Generator>) -> Self {
        Self { retriever, generator, template: PromptTemplate::default() }
    }

    /// Replace the prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// The retriever used by this chain.
    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    /// Answer `question`.
    ///
    /// Generation failures do not fail the call: the response becomes
    /// `"Error generating response: <reason>"`.
    ///
    /// # Errors
    ///
    /// Retrieval errors (embedder failures, dimension mismatches) are
    /// returned as-is.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let context = self.retriever.retrieve(question).await?;
        let quality = self.retriever.evaluate(&context);
        let prompt = self.template.render(question, &context);

        let response = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(model = self.generator.model_id(), error = %e, "generation failed");
                format!("Error generating response: {e}")
            }
        };
        info!(
            chunk_count = context.chunk_count,
            quality = %quality.quality,
            "answered question"
        );

        Ok(Answer { question: question.to_string(), context, prompt, response, quality })
    }
}
