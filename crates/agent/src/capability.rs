//! Capability boundary between the control loop and language models.
//!
//! The loop only ever sees two capabilities: structured classification and
//! free-text completion. Both take a fully rendered prompt.

use ragloop_core::AppResult;
use ragloop_llm::{LlmClient, LlmRequest};
use ragloop_prompt::BuiltPrompt;
use serde_json::Value;
use std::sync::Arc;

/// Structured classification used by the router and every quality gate.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a prompt. Malformed model output is `Value::Null`, never an error;
    /// transport failures are errors.
    async fn classify(&self, prompt: &BuiltPrompt) -> AppResult<Value>;
}

/// Free-text completion used for answers and query rewrites.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &BuiltPrompt) -> AppResult<String>;
}

fn to_request(prompt: &BuiltPrompt, model: &str) -> LlmRequest {
    let mut request = LlmRequest::new(prompt.user.clone(), model);
    if let Some(ref system) = prompt.system {
        request = request.with_system(system.clone());
    }
    request
}

/// `Classifier` backed by an LLM in JSON mode.
pub struct LlmClassifier {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl LlmClassifier {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait::async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, prompt: &BuiltPrompt) -> AppResult<Value> {
        let request = to_request(prompt, &self.model)
            .with_json_output()
            .with_temperature(0.0);

        let response = self.client.complete(&request).await?;
        let value = parse_structured(&response.content);

        if value.is_null() {
            tracing::warn!(
                prompt_id = prompt.prompt_id(),
                "Classifier returned unparseable output: {:?}",
                response.content
            );
        }

        Ok(value)
    }
}

/// `TextGenerator` backed by an LLM.
pub struct LlmTextGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: Option<f32>,
}

impl LlmTextGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait::async_trait]
impl TextGenerator for LlmTextGenerator {
    async fn complete(&self, prompt: &BuiltPrompt) -> AppResult<String> {
        let mut request = to_request(prompt, &self.model);
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        let response = self.client.complete(&request).await?;
        tracing::debug!(
            prompt_id = prompt.prompt_id(),
            total_tokens = response.usage.total_tokens,
            "Completion received"
        );

        Ok(response.content)
    }
}

/// Parse model output into JSON.
///
/// Accepts bare JSON, JSON inside a Markdown code fence, or a JSON object
/// embedded in surrounding prose. Anything else is `Value::Null`.
pub fn parse_structured(content: &str) -> Value {
    let trimmed = strip_fence(content.trim());

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value;
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str(&trimmed[start..=end]).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // Drop the info string ("json") on the opening fence line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
