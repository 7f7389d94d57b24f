//! Ragloop Core Library
//!
//! Foundational utilities shared by every ragloop crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Layered configuration

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AgentSettings, AppConfig, KnowledgeSettings};
pub use error::{AppError, AppResult};
