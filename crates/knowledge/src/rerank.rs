//! Relevance reranking of retrieved fragments.

use crate::types::RawFragment;
use ragloop_core::{AppError, AppResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Pairwise (query, passage) relevance scoring capability.
#[async_trait::async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// One score per passage, in passage order. Higher is more relevant.
    async fn score_batch(&self, query: &str, passages: &[&str]) -> AppResult<Vec<f32>>;
}

/// BM25-style term-overlap scorer over lowercase alphanumeric tokens.
///
/// The scored batch itself is the corpus for document frequencies.
#[derive(Debug, Clone)]
pub struct LexicalScorer {
    k1: f32,
    b: f32,
}

impl Default for LexicalScorer {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl LexicalScorer {
    pub fn new(k1: f32, b: f32) -> Self {
        Self { k1, b }
    }

    fn score(&self, query: &str, passages: &[&str]) -> Vec<f32> {
        let query_terms: HashSet<String> = tokenize(query).collect();
        let docs: Vec<Vec<String>> = passages.iter().map(|p| tokenize(p).collect()).collect();

        let n = docs.len() as f32;
        let avg_len = docs.iter().map(Vec::len).sum::<usize>() as f32 / n.max(1.0);

        let mut doc_freq: HashMap<&str, f32> = HashMap::new();
        for doc in &docs {
            let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for term in unique {
                if query_terms.contains(term) {
                    *doc_freq.entry(term).or_insert(0.0) += 1.0;
                }
            }
        }

        docs.iter()
            .map(|doc| {
                let len = doc.len() as f32;
                let mut term_freq: HashMap<&str, f32> = HashMap::new();
                for term in doc {
                    if query_terms.contains(term) {
                        *term_freq.entry(term.as_str()).or_insert(0.0) += 1.0;
                    }
                }

                term_freq
                    .iter()
                    .map(|(term, tf)| {
                        let df = doc_freq.get(term).copied().unwrap_or(0.0);
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        let norm = self.k1 * (1.0 - self.b + self.b * len / avg_len.max(1.0));
                        idf * tf * (self.k1 + 1.0) / (tf + norm)
                    })
                    .sum()
            })
            .collect()
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait::async_trait]
impl RelevanceScorer for LexicalScorer {
    async fn score_batch(&self, query: &str, passages: &[&str]) -> AppResult<Vec<f32>> {
        Ok(self.score(query, passages))
    }
}

/// Orders fragments by descending relevance score.
#[derive(Clone)]
pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    /// Rerank fragments, best first. Equal scores keep retrieval order.
    pub async fn rerank(&self, query: &str, fragments: Vec<RawFragment>) -> AppResult<Vec<RawFragment>> {
        if fragments.is_empty() {
            return Ok(fragments);
        }

        let passages: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
        let scores = self.scorer.score_batch(query, &passages).await?;

        if scores.len() != fragments.len() {
            return Err(AppError::Knowledge(format!(
                "Scorer returned {} scores for {} fragments",
                scores.len(),
                fragments.len()
            )));
        }

        let mut scored: Vec<(f32, RawFragment)> = scores
            .into_iter()
            .map(|s| if s.is_nan() { f32::NEG_INFINITY } else { s })
            .zip(fragments)
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        tracing::debug!(
            top_score = scored.first().map(|(s, _)| *s),
            "Reranked {} fragments",
            scored.len()
        );

        Ok(scored.into_iter().map(|(_, fragment)| fragment).collect())
    }
}
