//! Answer generation over reconstructed documents.

use crate::capability::TextGenerator;
use crate::state::{format_history, Turn};
use ragloop_core::AppResult;
use ragloop_knowledge::ReconstructedDocument;
use ragloop_prompt::{build_prompt, ids, PromptDefinition, PromptLibrary};
use std::collections::HashMap;
use std::sync::Arc;

/// Context text used when no documents are attached.
pub const NO_DOCUMENTS: &str = "No documents found.";

const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

pub struct AnswerGenerator {
    generator: Arc<dyn TextGenerator>,
    prompt: PromptDefinition,
    history_window: usize,
}

impl AnswerGenerator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        prompts: &PromptLibrary,
        history_window: usize,
    ) -> AppResult<Self> {
        Ok(Self {
            generator,
            prompt: prompts.get(ids::ANSWER_GENERATE)?.clone(),
            history_window,
        })
    }

    pub async fn generate(
        &self,
        history: &[Turn],
        question: &str,
        documents: &[ReconstructedDocument],
    ) -> AppResult<String> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert(
            "history".to_string(),
            format_history(history, self.history_window),
        );
        variables.insert("context".to_string(), format_context(documents));

        let prompt = build_prompt(&self.prompt, variables)?;
        let answer = self.generator.complete(&prompt).await?;

        tracing::debug!(
            documents = documents.len(),
            answer_len = answer.len(),
            "Generated answer"
        );
        Ok(answer.trim().to_string())
    }
}

/// Render documents as labelled context blocks.
pub fn format_context(documents: &[ReconstructedDocument]) -> String {
    if documents.is_empty() {
        return NO_DOCUMENTS.to_string();
    }

    documents
        .iter()
        .map(|doc| {
            let pages = doc
                .pages
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("[DOCUMENT: {} | PAGES: {}]\n{}", doc.source, pages, doc.content)
        })
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}
