//! Prompt system for ragloop.
//!
//! This crate provides structured prompt management with:
//! - Built-in YAML prompt definitions for routing, grading, rewriting and answering
//! - Per-workspace overrides in `.ragloop/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{ids, list_prompts, load_builtin, load_prompt, PromptLibrary};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec};
