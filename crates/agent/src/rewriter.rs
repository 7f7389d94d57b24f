//! Query rewriting after a failed attempt.

use crate::capability::TextGenerator;
use crate::state::{format_history, Turn};
use ragloop_core::AppResult;
use ragloop_prompt::{build_prompt, ids, PromptDefinition, PromptLibrary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Why the previous attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Every retrieved fragment failed the relevance gate
    #[serde(rename = "no-relevant-documents-found")]
    NoRelevantDocuments,

    #[serde(rename = "generation-not-grounded")]
    NotGrounded,

    #[serde(rename = "generation-not-useful")]
    NotUseful,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NoRelevantDocuments => "no-relevant-documents-found",
            FailureReason::NotGrounded => "generation-not-grounded",
            FailureReason::NotUseful => "generation-not-useful",
        }
    }

    /// Instruction bias handed to the rewriter.
    pub fn instruction(&self) -> &'static str {
        match self {
            FailureReason::NoRelevantDocuments => {
                "No relevant documents were found. Broaden the query: use synonyms, \
                 more general terms, and drop overly specific constraints."
            }
            FailureReason::NotGrounded => {
                "The previous answer was not supported by the retrieved documents. \
                 Add concrete grounding keywords (names, figures, section terms) that \
                 would retrieve the supporting passages."
            }
            FailureReason::NotUseful => {
                "The previous answer did not address the question. Refocus the query \
                 on the user's actual intent and the specific information requested."
            }
        }
    }
}

/// Produces a new standalone search query.
pub struct QueryRewriter {
    generator: Arc<dyn TextGenerator>,
    prompt: PromptDefinition,
    history_window: usize,
}

impl QueryRewriter {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        prompts: &PromptLibrary,
        history_window: usize,
    ) -> AppResult<Self> {
        Ok(Self {
            generator,
            prompt: prompts.get(ids::REWRITE_QUERY)?.clone(),
            history_window,
        })
    }

    /// Rewrite `question`. An empty rewrite keeps the current question.
    pub async fn rewrite(
        &self,
        question: &str,
        history: &[Turn],
        reason: FailureReason,
    ) -> AppResult<String> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert(
            "history".to_string(),
            format_history(history, self.history_window),
        );
        variables.insert("reason".to_string(), reason.as_str().to_string());
        variables.insert("instruction".to_string(), reason.instruction().to_string());

        let prompt = build_prompt(&self.prompt, variables)?;
        let raw = self.generator.complete(&prompt).await?;
        let rewritten = clean_query(&raw);

        if rewritten.is_empty() {
            tracing::warn!(reason = reason.as_str(), "Rewriter returned nothing, keeping query");
            return Ok(question.to_string());
        }

        tracing::info!(reason = reason.as_str(), "Rewrote query: {}", rewritten);
        Ok(rewritten)
    }
}

/// Trim whitespace and a single pair of wrapping quotes.
fn clean_query(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_names() {
        assert_eq!(
            serde_json::to_value(FailureReason::NoRelevantDocuments).unwrap(),
            "no-relevant-documents-found"
        );
        assert_eq!(
            serde_json::to_value(FailureReason::NotGrounded).unwrap(),
            FailureReason::NotGrounded.as_str()
        );
    }

    #[test]
    fn test_instructions_are_distinct() {
        let reasons = [
            FailureReason::NoRelevantDocuments,
            FailureReason::NotGrounded,
            FailureReason::NotUseful,
        ];
        for (i, a) in reasons.iter().enumerate() {
            for b in &reasons[i + 1..] {
                assert_ne!(a.instruction(), b.instruction());
            }
        }
        assert!(FailureReason::NoRelevantDocuments.instruction().contains("Broaden"));
    }

    #[test]
    fn test_clean_query() {
        assert_eq!(clean_query("  \"annual report revenue\" \n"), "annual report revenue");
        assert_eq!(clean_query("revenue \"growth\""), "revenue \"growth\"");
        assert_eq!(clean_query("   "), "");
    }
}
