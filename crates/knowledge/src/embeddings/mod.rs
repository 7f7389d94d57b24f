//! Embedding providers for the fragment store.
//!
//! Embeddings are only used to rank fragments for `search`; the control loop
//! never sees vectors.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{OllamaEmbedder, TrigramEmbedder};
