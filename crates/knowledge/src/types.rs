//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Element category a fragment was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    #[default]
    Text,
    Image,
    Table,
}

impl FragmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::Text => "text",
            FragmentKind::Image => "image",
            FragmentKind::Table => "table",
        }
    }

    /// Parse a stored kind, falling back to plain text for anything unknown.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "image" => FragmentKind::Image,
            "table" => FragmentKind::Table,
            _ => FragmentKind::Text,
        }
    }

    /// Prefix applied to the searchable text of this kind at import.
    pub fn text_prefix(&self) -> &'static str {
        match self {
            FragmentKind::Text => "",
            FragmentKind::Image => "IMAGE SUMMARY: ",
            FragmentKind::Table => "TABLE DATA: ",
        }
    }
}

/// An atomic retrieval unit. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFragment {
    /// Unique fragment identifier
    pub id: String,

    /// Identity shared by every fragment of the same parent document
    pub parent_id: String,

    /// Origin filename of the parent document
    pub source: String,

    /// Page the fragment sits on (1-based)
    pub page: u32,

    /// Position within the parent; the only ordering between siblings
    pub element_index: u32,

    pub kind: FragmentKind,

    pub text: String,
}

/// One parent document's relevant extent, rebuilt from all its siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructedDocument {
    /// Sibling texts in position order with inline page markers
    pub content: String,

    /// Origin filename
    pub source: String,

    /// Ascending, deduplicated page numbers touched by the siblings
    pub pages: Vec<u32>,

    /// Parent identity used for deduplication
    pub doc_id: String,
}

/// One pre-partitioned element from an import file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportElement {
    pub text: String,

    #[serde(default)]
    pub page: Option<u32>,

    #[serde(default)]
    pub kind: Option<FragmentKind>,
}

/// Statistics from an import operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    /// Parent identity assigned to the imported document
    pub parent_id: String,

    pub source: String,

    /// Number of fragments stored
    pub fragments_count: u32,

    /// Lines skipped because they were blank
    pub skipped_lines: u32,

    /// Duration in seconds
    pub duration_secs: f64,
}

/// Summary of a stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub parent_id: String,
    pub source: String,
    pub imported_at: DateTime<Utc>,
    pub fragment_count: u32,
}

/// Statistics for the fragment store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub documents_count: u32,
    pub fragments_count: u32,

    /// Most recent imports first
    pub documents: Vec<DocumentSummary>,
}
