//! Intent routing.

use crate::capability::Classifier;
use crate::verdict::Intent;
use ragloop_core::AppResult;
use ragloop_prompt::{build_prompt, ids, PromptDefinition, PromptLibrary};
use std::collections::HashMap;
use std::sync::Arc;

/// Decides whether a question needs document grounding.
pub struct IntentRouter {
    classifier: Arc<dyn Classifier>,
    prompt: PromptDefinition,
}

impl IntentRouter {
    pub fn new(classifier: Arc<dyn Classifier>, prompts: &PromptLibrary) -> AppResult<Self> {
        Ok(Self {
            classifier,
            prompt: prompts.get(ids::ROUTE_INTENT)?.clone(),
        })
    }

    /// One classification call. Unparseable output routes to `Technical`;
    /// a failed call is returned as an error.
    pub async fn classify_intent(&self, question: &str) -> AppResult<Intent> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        let prompt = build_prompt(&self.prompt, variables)?;

        let value = self.classifier.classify(&prompt).await?;
        let intent = Intent::from_structured(&value);

        if value.is_null() {
            tracing::warn!("Intent classification unparseable, routing as technical");
        }
        tracing::info!(intent = intent.as_str(), "Routed question");

        Ok(intent)
    }
}
