//! Diagnostic classification of a retrieved context.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::RetrievedContext;

/// Ordered retrieval quality scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl fmt::Display for RetrievalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        };
        f.write_str(label)
    }
}

/// A diagnostic flag raised by [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    /// Nothing was retrieved.
    NoRelevantContext,
    /// Average score below 0.3.
    LowRelevance,
    /// Fewer than two chunks.
    LimitedDiversity,
    /// Context uses more than 90% of its budget.
    NearBudgetLimit,
}

impl QualityIssue {
    /// Short label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::NoRelevantContext => "no relevant context",
            Self::LowRelevance => "low relevance",
            Self::LimitedDiversity => "limited diversity",
            Self::NearBudgetLimit => "context near budget limit",
        }
    }

    /// Suggested remedy.
    pub fn recommendation(self) -> &'static str {
        match self {
            Self::NoRelevantContext => "rephrase the question or add documents covering the topic",
            Self::LowRelevance => "lower the minimum score threshold or extend the expansion table",
            Self::LimitedDiversity => "increase top_k to draw on more chunks",
            Self::NearBudgetLimit => "raise max_context_length or use smaller chunks",
        }
    }
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of [`evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub quality: RetrievalQuality,
    /// Average score of the context.
    pub score: f32,
    pub chunk_count: usize,
    /// Context length in characters.
    pub context_length: usize,
    pub issues: Vec<QualityIssue>,
    /// One recommendation per issue, in the same order.
    pub recommendations: Vec<String>,
}

impl QualityReport {
    /// Whether `issue` was raised.
    pub fn has_issue(&self, issue: QualityIssue) -> bool {
        self.issues.contains(&issue)
    }
}

/// Classify `context` by its average score and chunk count.
///
/// | quality   | average score | chunks |
/// |-----------|---------------|--------|
/// | excellent | ≥ 0.5         | ≥ 3    |
/// | good      | ≥ 0.3         | ≥ 2    |
/// | fair      | ≥ 0.2         | ≥ 1    |
/// | poor      | otherwise     |        |
///
/// Issues are diagnostics only.
pub fn evaluate(context: &RetrievedContext) -> QualityReport {
    let score = context.average_score;
    let count = context.chunk_count;

    let quality = if score >= 0.5 && count >= 3 {
        RetrievalQuality::Excellent
    } else if score >= 0.3 && count >= 2 {
        RetrievalQuality::Good
    } else if score >= 0.2 && count >= 1 {
        RetrievalQuality::Fair
    } else {
        RetrievalQuality::Poor
    };

    let mut issues = Vec::new();
    if count == 0 {
        issues.push(QualityIssue::NoRelevantContext);
    }
    if score < 0.3 {
        issues.push(QualityIssue::LowRelevance);
    }
    if count < 2 {
        issues.push(QualityIssue::LimitedDiversity);
    }
    if context.total_length as f64 > context.max_context_length as f64 * 0.9 {
        issues.push(QualityIssue::NearBudgetLimit);
    }

    QualityReport {
        quality,
        score,
        chunk_count: count,
        context_length: context.total_length,
        recommendations: issues.iter().map(|i| i.recommendation().to_string()).collect(),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(average_score: f32, chunk_count: usize, total_length: usize) -> RetrievedContext {
        RetrievedContext { average_score, chunk_count, total_length, ..RetrievedContext::empty(1000) }
    }

    #[test]
    fn classifies_by_score_and_count() {
        assert_eq!(evaluate(&context(0.6, 4, 100)).quality, RetrievalQuality::Excellent);
        assert_eq!(evaluate(&context(0.6, 2, 100)).quality, RetrievalQuality::Good);
        assert_eq!(evaluate(&context(0.25, 3, 100)).quality, RetrievalQuality::Fair);
        assert_eq!(evaluate(&context(0.1, 0, 0)).quality, RetrievalQuality::Poor);
    }

    #[test]
    fn excellent_context_has_no_issues() {
        let report = evaluate(&context(0.6, 4, 100));
        assert!(report.issues.is_empty());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn empty_context_flags_no_relevant_context() {
        let report = evaluate(&context(0.1, 0, 0));
        assert!(report.has_issue(QualityIssue::NoRelevantContext));
        assert!(report.has_issue(QualityIssue::LowRelevance));
        assert!(report.has_issue(QualityIssue::LimitedDiversity));
        assert_eq!(report.recommendations.len(), report.issues.len());
    }

    #[test]
    fn flags_context_near_budget() {
        assert!(evaluate(&context(0.6, 3, 901)).has_issue(QualityIssue::NearBudgetLimit));
        assert!(!evaluate(&context(0.6, 3, 900)).has_issue(QualityIssue::NearBudgetLimit));
    }

    #[test]
    fn scale_is_ordered() {
        assert!(RetrievalQuality::Poor < RetrievalQuality::Fair);
        assert!(RetrievalQuality::Good < RetrievalQuality::Excellent);
        assert_eq!(QualityIssue::LowRelevance.to_string(), "low relevance");
        assert_eq!(RetrievalQuality::Excellent.to_string(), "excellent");
    }
}
