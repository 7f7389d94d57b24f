//! Fragment storage and document context for ragloop.
//!
//! Provides the retrieval side of the control loop:
//! - `FragmentStore` and its SQLite implementation
//! - Embedding providers used to rank fragments
//! - `Reranker` over a pluggable `RelevanceScorer`
//! - `ContextReconstructor`, which expands fragments into parent documents
//! - JSONL import of pre-partitioned document elements

pub mod embeddings;
pub mod import;
pub mod reconstruct;
pub mod rerank;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingProvider, OllamaEmbedder, TrigramEmbedder};
pub use import::{import_file, import_jsonl};
pub use reconstruct::{assemble, page_marker, ContextReconstructor};
pub use rerank::{LexicalScorer, RelevanceScorer, Reranker};
pub use store::{FragmentStore, SqliteFragmentStore};
pub use types::{
    DocumentSummary, FragmentKind, ImportElement, ImportStats, RawFragment,
    ReconstructedDocument, StoreStats,
};

use ragloop_core::{AppConfig, AppResult};

/// Open the workspace fragment store with the configured embedder.
pub fn open_store(config: &AppConfig) -> AppResult<SqliteFragmentStore> {
    let endpoint = config.resolve_endpoint("ollama");
    let embedder = create_provider(&config.knowledge, endpoint.as_deref())?;
    SqliteFragmentStore::open(&config.fragment_store_path(), embedder)
}

