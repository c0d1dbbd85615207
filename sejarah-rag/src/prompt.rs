//! Prompt assembly from a retrieved context.

use serde::{Deserialize, Serialize};

use crate::document::RetrievedContext;

const DEFAULT_INSTRUCTIONS: &str = "\
Anda adalah asisten AI yang ahli dalam sejarah kemerdekaan Indonesia.
Tugas Anda adalah menjawab pertanyaan berdasarkan konteks sejarah yang diberikan dengan akurat dan informatif.

INSTRUKSI:
1. Jawab berdasarkan informasi dalam konteks yang diberikan
2. Jika informasi tidak cukup dalam konteks, katakan dengan jelas
3. Berikan jawaban yang faktual dan objektif
4. Gunakan bahasa Indonesia yang baik dan benar
5. Sebutkan sumber informasi jika relevan";

/// Four-segment prompt: instructions, history context, sources, question.
///
/// Every segment is always present, in that order, even when the context is
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub instructions: String,
    pub context_heading: String,
    pub sources_heading: String,
    pub question_heading: String,
    /// Text the model is asked to continue from.
    pub answer_lead: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            context_heading: "KONTEKS SEJARAH:".to_string(),
            sources_heading: "SUMBER REFERENSI:".to_string(),
            question_heading: "PERTANYAAN:".to_string(),
            answer_lead: "JAWABAN: Berdasarkan informasi sejarah di atas,".to_string(),
        }
    }
}

impl PromptTemplate {
    /// Render the prompt for `question` over `context`.
    pub fn render(&self, question: &str, context: &RetrievedContext) -> String {
        let sources = context.distinct_sources.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
        format!(
            "{}\n\n{}\n{}\n\n{} {}\n\n{} {}\n\n{}",
            self.instructions,
            self.context_heading,
            context.assembled_text,
            self.sources_heading,
            sources,
            self.question_heading,
            question,
            self.answer_lead,
        )
    }
}
