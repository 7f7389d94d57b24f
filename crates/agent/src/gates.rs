//! Quality gates: relevance, grounding and usefulness judges.
//!
//! Every gate is one classification call that fails closed: output that
//! does not clearly say "yes" grades as `No`.

use crate::capability::Classifier;
use crate::verdict::Verdict;
use futures::stream::{self, StreamExt, TryStreamExt};
use futures::FutureExt;
use ragloop_core::AppResult;
use ragloop_knowledge::{RawFragment, ReconstructedDocument};
use ragloop_prompt::{build_prompt, ids, PromptDefinition, PromptLibrary};
use std::collections::HashMap;
use std::sync::Arc;

pub struct QualityGates {
    classifier: Arc<dyn Classifier>,
    relevance: PromptDefinition,
    grounding: PromptDefinition,
    usefulness: PromptDefinition,
}

impl QualityGates {
    pub fn new(classifier: Arc<dyn Classifier>, prompts: &PromptLibrary) -> AppResult<Self> {
        Ok(Self {
            classifier,
            relevance: prompts.get(ids::GRADE_RELEVANCE)?.clone(),
            grounding: prompts.get(ids::GRADE_GROUNDING)?.clone(),
            usefulness: prompts.get(ids::GRADE_USEFULNESS)?.clone(),
        })
    }

    async fn grade(
        &self,
        definition: &PromptDefinition,
        variables: [(&str, &str); 2],
    ) -> AppResult<Verdict> {
        let variables: HashMap<String, String> = variables
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let prompt = build_prompt(definition, variables)?;

        let value = self.classifier.classify(&prompt).await?;
        Ok(Verdict::from_structured(&value))
    }

    /// Is this document relevant to the question?
    pub async fn grade_relevance(&self, question: &str, document: &str) -> AppResult<Verdict> {
        self.grade(
            &self.relevance,
            [("question", question), ("document", document)],
        )
        .await
    }

    /// Is the generation supported by the documents? No documents passes without a call.
    pub async fn grade_grounding(
        &self,
        documents: &[ReconstructedDocument],
        generation: &str,
    ) -> AppResult<Verdict> {
        if documents.is_empty() {
            tracing::debug!("No documents attached, grounding passes");
            return Ok(Verdict::Yes);
        }

        let facts = documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        self.grade(
            &self.grounding,
            [("documents", facts.as_str()), ("generation", generation)],
        )
        .await
    }

    /// Does the generation answer the question? Empty generations fail without a call.
    pub async fn grade_usefulness(&self, question: &str, generation: &str) -> AppResult<Verdict> {
        if generation.trim().is_empty() {
            tracing::debug!("Empty generation, usefulness fails");
            return Ok(Verdict::No);
        }

        self.grade(
            &self.usefulness,
            [("question", question), ("generation", generation)],
        )
        .await
    }

    /// Grade every fragment with at most `concurrency` calls in flight.
    ///
    /// Verdicts come back in fragment order regardless of completion order.
    pub async fn grade_fragments(
        &self,
        question: &str,
        fragments: &[RawFragment],
        concurrency: usize,
    ) -> AppResult<Vec<Verdict>> {
        stream::iter(fragments)
            .map(|fragment| self.grade_relevance(question, &fragment.text))
            .buffered(concurrency.max(1))
            .try_collect::<Vec<_>>()
            .boxed()
            .await
    }
}
