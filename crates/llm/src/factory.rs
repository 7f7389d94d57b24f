//! LLM provider factory.
//!
//! Resolves a configured provider name into a concrete client.

use crate::client::LlmClient;
use crate::providers::{ollama, openai, OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use ragloop_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Connection settings for a provider.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions<'a> {
    /// Custom endpoint URL
    pub endpoint: Option<&'a str>,

    /// API key (required by OpenAI-compatible providers)
    pub api_key: Option<&'a str>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Create an LLM client based on the provider name.
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or a required
/// secret is missing.
pub fn create_client(provider: &str, options: ClientOptions<'_>) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    match provider_type {
        ProviderType::Ollama => {
            let base_url = options.endpoint.unwrap_or(ollama::DEFAULT_OLLAMA_URL);
            let client = match options.timeout_secs {
                Some(secs) => OllamaClient::with_timeout(base_url, Duration::from_secs(secs)),
                None => OllamaClient::with_base_url(base_url),
            };
            Ok(Arc::new(client))
        }
        ProviderType::OpenAI => {
            let api_key = options.api_key.ok_or_else(|| {
                AppError::Config("OpenAI provider requires API key".to_string())
            })?;
            let base_url = options.endpoint.unwrap_or(openai::DEFAULT_OPENAI_URL);
            Ok(Arc::new(OpenAiClient::new(base_url, api_key)))
        }
    }
}
