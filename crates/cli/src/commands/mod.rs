//! Command handlers for the ragloop CLI.

pub mod ask;
pub mod chat;
pub mod knowledge;
pub mod thread;

pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use knowledge::KnowledgeCommand;
pub use thread::ThreadCommand;
