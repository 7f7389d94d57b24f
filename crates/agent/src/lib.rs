//! Corrective retrieval loop for ragloop.
//!
//! A question is routed by intent, answered from reranked and reconstructed
//! documents, and checked by relevance, grounding and usefulness gates. A
//! failed gate rewrites the query and retries within a fixed budget.
//!
//! # Example
//! ```no_run
//! use ragloop_agent::{Agent, AskRequest};
//! use ragloop_core::AppConfig;
//!
//! # async fn example() -> ragloop_core::AppResult<()> {
//! let config = AppConfig::load()?;
//! let agent = Agent::from_config(&config)?;
//! let response = agent
//!     .ask(AskRequest::new("What is this report about?", "default"))
//!     .await?;
//! println!("{} ({} sources)", response.answer, response.metadata.sources_count);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod capability;
pub mod checkpoint;
pub mod gates;
pub mod generator;
pub mod orchestrator;
pub mod rewriter;
pub mod router;
pub mod state;
pub mod verdict;

#[cfg(test)]
mod tests;

pub use agent::{Agent, AskMetadata, AskRequest, AskResponse};
pub use capability::{parse_structured, Classifier, LlmClassifier, LlmTextGenerator, TextGenerator};
pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
pub use gates::QualityGates;
pub use generator::{format_context, AnswerGenerator};
pub use orchestrator::{Collaborators, Orchestrator, Step};
pub use rewriter::{FailureReason, QueryRewriter};
pub use router::IntentRouter;
pub use state::{Role, RunSnapshot, RunState, Turn};
pub use verdict::{Intent, Verdict};
