//! Expansion of top fragments into their full parent documents.

use crate::store::FragmentStore;
use crate::types::{RawFragment, ReconstructedDocument};
use ragloop_core::AppResult;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Marker inserted into document content wherever the page changes.
pub fn page_marker(page: u32) -> String {
    format!("\n<<< PAGE {} >>>\n", page)
}

/// Rebuilds parent documents from the fragment store.
#[derive(Clone)]
pub struct ContextReconstructor {
    store: Arc<dyn FragmentStore>,
}

impl ContextReconstructor {
    pub fn new(store: Arc<dyn FragmentStore>) -> Self {
        Self { store }
    }

    /// Expand fragments (in rank order) into at most `limit` distinct parent
    /// documents, preserving the rank order of each parent's first fragment.
    pub async fn reconstruct(
        &self,
        query: &str,
        top_fragments: &[RawFragment],
        limit: usize,
    ) -> AppResult<Vec<ReconstructedDocument>> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut documents = Vec::new();

        for fragment in top_fragments {
            if documents.len() >= limit {
                break;
            }
            if !seen.insert(fragment.parent_id.as_str()) {
                continue;
            }

            let mut siblings = self.store.fetch_by_parent(&fragment.parent_id).await?;
            if siblings.is_empty() {
                tracing::warn!(
                    parent_id = %fragment.parent_id,
                    "Parent has no stored siblings, using the ranked fragment alone"
                );
                siblings.push(fragment.clone());
            }

            documents.push(assemble(&fragment.parent_id, siblings));
        }

        tracing::debug!(
            query = %query,
            "Reconstructed {} documents from {} fragments",
            documents.len(),
            top_fragments.len()
        );

        Ok(documents)
    }
}

/// Build one document from all siblings of a parent.
///
/// Siblings are ordered by element position only. A page marker precedes the
/// first sibling and every sibling whose page differs from the previous one.
pub fn assemble(parent_id: &str, mut siblings: Vec<RawFragment>) -> ReconstructedDocument {
    siblings.sort_by_key(|f| f.element_index);

    let source = siblings
        .first()
        .map(|f| f.source.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    let mut parts = Vec::with_capacity(siblings.len() * 2);
    let mut pages = BTreeSet::new();
    let mut current_page = None;

    for sibling in &siblings {
        pages.insert(sibling.page);
        if current_page != Some(sibling.page) {
            parts.push(page_marker(sibling.page));
            current_page = Some(sibling.page);
        }
        parts.push(sibling.text.clone());
    }

    ReconstructedDocument {
        content: parts.join("\n"),
        source,
        pages: pages.into_iter().collect(),
        doc_id: parent_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FragmentKind, StoreStats};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fragment(parent: &str, index: u32, page: u32) -> RawFragment {
        RawFragment {
            id: format!("{}-{}", parent, index),
            parent_id: parent.to_string(),
            source: format!("{}.pdf", parent),
            page,
            element_index: index,
            kind: FragmentKind::Text,
            text: format!("{} element {}", parent, index),
        }
    }

    #[derive(Default)]
    struct MapStore {
        siblings: HashMap<String, Vec<RawFragment>>,
        fetches: AtomicUsize,
    }

    impl MapStore {
        fn with_parent(mut self, parent: &str, pages: &[u32]) -> Self {
            // Stored out of position order on purpose
            let mut fragments: Vec<RawFragment> = pages
                .iter()
                .enumerate()
                .map(|(i, page)| fragment(parent, i as u32, *page))
                .collect();
            fragments.reverse();
            self.siblings.insert(parent.to_string(), fragments);
            self
        }
    }

    #[async_trait::async_trait]
    impl FragmentStore for MapStore {
        async fn search(&self, _query: &str, _k: usize) -> AppResult<Vec<RawFragment>> {
            Ok(Vec::new())
        }

        async fn fetch_by_parent(&self, parent_id: &str) -> AppResult<Vec<RawFragment>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.siblings.get(parent_id).cloned().unwrap_or_default())
        }

        async fn stats(&self) -> AppResult<StoreStats> {
            Ok(StoreStats::default())
        }
    }

    #[test]
    fn test_page_markers_on_transitions_only() {
        let siblings: Vec<RawFragment> = [1, 1, 2, 2, 3]
            .iter()
            .enumerate()
            .map(|(i, page)| fragment("p", i as u32, *page))
            .collect();

        let doc = assemble("p", siblings);
        let parts: Vec<&str> = doc.content.split('\n').filter(|l| !l.is_empty()).collect();

        assert_eq!(
            parts,
            vec![
                "<<< PAGE 1 >>>",
                "p element 0",
                "p element 1",
                "<<< PAGE 2 >>>",
                "p element 2",
                "p element 3",
                "<<< PAGE 3 >>>",
                "p element 4",
            ]
        );
        assert_eq!(doc.content.matches("<<< PAGE").count(), 3);
        assert_eq!(doc.pages, vec![1, 2, 3]);
        assert_eq!(doc.source, "p.pdf");
        assert_eq!(doc.doc_id, "p");
    }

    #[test]
    fn test_siblings_ordered_by_position_not_page() {
        // Position order visits page 2 before page 1
        let siblings = vec![fragment("p", 1, 1), fragment("p", 0, 2), fragment("p", 2, 2)];

        let doc = assemble("p", siblings);
        assert!(doc.content.starts_with("\n<<< PAGE 2 >>>\n\np element 0"));
        assert_eq!(doc.content.matches("<<< PAGE 2 >>>").count(), 2);
        assert_eq!(doc.pages, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_empty_input_yields_empty_output() {
        let store = Arc::new(MapStore::default());
        let reconstructor = ContextReconstructor::new(store.clone());

        let docs = reconstructor.reconstruct("q", &[], 3).await.unwrap();
        assert!(docs.is_empty());
        assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dedupes_parents_and_keeps_rank_order() {
        let store = Arc::new(
            MapStore::default()
                .with_parent("a", &[1, 1])
                .with_parent("b", &[4, 5, 5]),
        );
        let reconstructor = ContextReconstructor::new(store.clone());

        let top = vec![fragment("b", 2, 5), fragment("a", 0, 1), fragment("b", 0, 4)];
        let docs = reconstructor.reconstruct("q", &top, 3).await.unwrap();

        assert_eq!(
            docs.iter().map(|d| d.doc_id.as_str()).collect::<Vec<_>>(),
            vec!["b", "a"]
        );
        // Full re-fetch: every sibling of b, not only the ranked ones
        assert!(docs[0].content.contains("b element 1"));
        assert_eq!(docs[0].pages, vec![4, 5]);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_limit_caps_distinct_parents() {
        let store = Arc::new(
            MapStore::default()
                .with_parent("a", &[1])
                .with_parent("b", &[1])
                .with_parent("c", &[1]),
        );
        let reconstructor = ContextReconstructor::new(store);

        let top = vec![fragment("a", 0, 1), fragment("b", 0, 1), fragment("c", 0, 1)];
        let docs = reconstructor.reconstruct("q", &top, 2).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].doc_id, "b");
    }

    #[tokio::test]
    async fn test_reordered_ties_select_same_parents() {
        let store = Arc::new(
            MapStore::default()
                .with_parent("a", &[1, 2])
                .with_parent("b", &[3]),
        );
        let reconstructor = ContextReconstructor::new(store);

        let a0 = fragment("a", 0, 1);
        let a1 = fragment("a", 1, 2);
        let b0 = fragment("b", 0, 3);

        let first = reconstructor
            .reconstruct("q", &[a0.clone(), b0.clone(), a1.clone()], 3)
            .await
            .unwrap();
        let second = reconstructor
            .reconstruct("q", &[b0, a0, a1], 3)
            .await
            .unwrap();

        fn ids(docs: &[ReconstructedDocument]) -> Vec<&str> {
            docs.iter().map(|d| d.doc_id.as_str()).collect()
        }
        assert_eq!(ids(&first), vec!["a", "b"]);
        assert_eq!(ids(&second), vec!["b", "a"]);

        // Same documents, only the leading order differs
        let mut first = first;
        let mut second = second;
        first.sort_by(|x, y| x.doc_id.cmp(&y.doc_id));
        second.sort_by(|x, y| x.doc_id.cmp(&y.doc_id));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_siblings_fall_back_to_fragment() {
        let reconstructor = ContextReconstructor::new(Arc::new(MapStore::default()));
        let docs = reconstructor
            .reconstruct("q", &[fragment("orphan", 3, 7)], 3)
            .await
            .unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].pages, vec![7]);
        assert!(docs[0].content.ends_with("orphan element 3"));
    }
}
