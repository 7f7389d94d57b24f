//! Error types for ragloop.
//!
//! A single error enum covers every failure category the workspace can
//! surface: configuration, I/O, model transport, document store, prompt
//! rendering and orchestration.

use thiserror::Error;

/// Unified error type for ragloop.
///
/// Library functions return `Result<T, AppError>`. Collaborator output is
/// never trusted enough to panic on; failures are represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Model transport or provider errors (classification, generation, rewrite)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Document store, embedding and reranking errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt loading and rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Orchestration and checkpoint errors
    #[error("Agent error: {0}")]
    Agent(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
