//! # Vector search
//!
//! Brute-force cosine similarity over every active entry that has an
//! embedding. The knowledge base is small, so an ANN index would cost more
//! than it saves.

use std::sync::Arc;
use tracing::debug;

use crate::config::ScoringWeights;
use crate::knowledge::{SearchResult, sort_by_score_desc};
use crate::store::{KnowledgeStore, StoreError};

/// `dot(a, b) / (|a| * |b|)`.
///
/// Returns `0.0` for vectors of different length, empty vectors and
/// zero-norm vectors.
///
/// ```rust
/// use portfolio_assistant::vector_search::cosine_similarity;
///
/// assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
/// assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
/// assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Clone)]
pub struct VectorSearchEngine {
    store: Arc<dyn KnowledgeStore>,
    weights: ScoringWeights,
}

impl VectorSearchEngine {
    pub fn new(store: Arc<dyn KnowledgeStore>, weights: ScoringWeights) -> Self {
        Self { store, weights }
    }

    /// Entries with similarity above the relevance threshold, scored
    /// `similarity * w_sim + priority/10 * w_prio`, best first.
    ///
    /// A missing query vector yields no results.
    pub async fn search(
        &self,
        query_vector: Option<&[f32]>,
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError> {
        let Some(query_vector) = query_vector else {
            return Ok(Vec::new());
        };
        let w = &self.weights;

        let mut results: Vec<SearchResult> = self
            .store
            .entries_with_embeddings()
            .await?
            .into_iter()
            .filter_map(|(entry, vector)| {
                let similarity = cosine_similarity(query_vector, &vector);
                (similarity > w.relevance_threshold).then(|| {
                    let score =
                        similarity * w.vector_similarity + entry.priority_weight() * w.vector_priority;
                    SearchResult::vector(entry, score)
                })
            })
            .collect();

        sort_by_score_desc(&mut results);
        results.truncate(limit);
        debug!(count = results.len(), "vector search done");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Category, ResultSource};
    use crate::test_support::{InMemoryStore, entry};

    #[test]
    fn cosine_properties() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);

        let a = [0.3f32, -1.2, 4.0, 0.01];
        let b = [2.0f32, 0.5, -0.7, 3.3];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn threshold_scoring_and_order() {
        let store = InMemoryStore::with_entries(vec![
            entry(1, Category::Skills, "aligned", "a", 5),
            entry(2, Category::Skills, "orthogonal", "b", 10),
            entry(3, Category::Skills, "close", "c", 0),
            entry(4, Category::Skills, "no embedding", "d", 10),
        ]);
        store.seed_embedding(1, vec![1.0, 0.0]);
        store.seed_embedding(2, vec![0.0, 1.0]);
        store.seed_embedding(3, vec![1.0, 1.0]);
        let engine = VectorSearchEngine::new(Arc::new(store), ScoringWeights::default());

        let results = engine.search(Some(&[1.0, 0.0]), 10).await.unwrap();
        let ids: Vec<i32> = results.iter().map(SearchResult::id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!((results[0].scores.vector - (0.9 + 0.05)).abs() < 1e-9);
        assert!((results[1].score() - std::f64::consts::FRAC_1_SQRT_2 * 0.9).abs() < 1e-6);
        assert!(results.iter().all(|r| r.source == ResultSource::VectorSearch));

        let capped = engine.search(Some(&[1.0, 0.0]), 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn missing_query_vector_is_empty() {
        let store = InMemoryStore::with_entries(vec![entry(1, Category::Skills, "a", "a", 5)]);
        store.seed_embedding(1, vec![1.0]);
        let engine = VectorSearchEngine::new(Arc::new(store), ScoringWeights::default());
        assert!(engine.search(None, 5).await.unwrap().is_empty());
    }
}
