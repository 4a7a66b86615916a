//! # Fusion
//!
//! Weighted-sum merge of vector and keyword result lists, keyed by entry id.

use std::collections::{HashMap, HashSet};

use crate::config::ScoringWeights;
use crate::knowledge::{SearchResult, sort_by_score_desc};

/// Merge `vector` and `keyword` results into one ranked list of at most `limit`.
///
/// - vector only: `combined = vector * w_v`
/// - keyword only: `combined = keyword * w_k`
/// - both: `combined = vector * w_v + keyword * w_k`
///
/// An entry found by both keeps the vector result's source. Duplicate ids
/// inside one input list keep their first occurrence.
pub fn fuse(
    vector: Vec<SearchResult>,
    keyword: Vec<SearchResult>,
    limit: usize,
    weights: &ScoringWeights,
) -> Vec<SearchResult> {
    let mut order: Vec<i32> = Vec::with_capacity(vector.len() + keyword.len());
    let mut merged: HashMap<i32, SearchResult> = HashMap::new();

    for mut result in vector {
        if merged.contains_key(&result.id()) {
            continue;
        }
        result.scores.keyword = 0.0;
        result.scores.combined = result.scores.vector * weights.fusion_vector;
        order.push(result.id());
        merged.insert(result.id(), result);
    }

    let mut seen_keyword = HashSet::new();
    for result in keyword {
        if !seen_keyword.insert(result.id()) {
            continue;
        }
        match merged.get_mut(&result.id()) {
            Some(existing) => {
                existing.scores.keyword = result.scores.keyword;
                existing.scores.combined = existing.scores.vector * weights.fusion_vector
                    + result.scores.keyword * weights.fusion_keyword;
            }
            None => {
                let mut result = result;
                result.scores.vector = 0.0;
                result.scores.combined = result.scores.keyword * weights.fusion_keyword;
                order.push(result.id());
                merged.insert(result.id(), result);
            }
        }
    }

    let mut fused: Vec<SearchResult> = order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .collect();
    sort_by_score_desc(&mut fused);
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Category, ResultSource};
    use crate::test_support::entry;

    fn v(id: i32, score: f64) -> SearchResult {
        SearchResult::vector(entry(id, Category::Projects, "t", "c", 1), score)
    }

    fn k(id: i32, score: f64) -> SearchResult {
        SearchResult::keyword(entry(id, Category::Projects, "t", "c", 1), score, ResultSource::CategoryMatch)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn weighted_sum_for_shared_and_single_entries() {
        let w = ScoringWeights::default();
        let fused = fuse(vec![v(1, 0.8), v(2, 0.5)], vec![k(1, 1.0), k(3, 0.9)], 10, &w);

        let by_id = |id| fused.iter().find(|r| r.id() == id).unwrap();
        assert!(close(by_id(1).score(), 0.8 * 0.6 + 1.0 * 0.4));
        assert!(close(by_id(2).score(), 0.5 * 0.6));
        assert!(close(by_id(3).score(), 0.9 * 0.4));
        assert_eq!(by_id(1).source, ResultSource::VectorSearch);
        assert_eq!(by_id(3).source, ResultSource::CategoryMatch);
        assert!(close(by_id(1).scores.keyword, 1.0));
    }

    #[test]
    fn overlapping_ids_appear_once_and_sorted() {
        let w = ScoringWeights::default();
        let fused = fuse(
            vec![v(1, 0.4), v(2, 0.9), v(3, 0.7)],
            vec![k(3, 0.2), k(2, 0.3), k(1, 0.9), k(4, 0.1)],
            10,
            &w,
        );
        let mut ids: Vec<i32> = fused.iter().map(SearchResult::id).collect();
        assert_eq!(ids.len(), 4);
        assert!(fused.windows(2).all(|p| p[0].score() >= p[1].score()));
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn truncates_to_limit_and_handles_empty_inputs() {
        let w = ScoringWeights::default();
        assert!(fuse(vec![], vec![], 5, &w).is_empty());
        let fused = fuse(vec![v(1, 0.9), v(2, 0.8)], vec![k(3, 0.5)], 2, &w);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].id(), 1);
    }

    #[test]
    fn weights_are_configurable() {
        let w = ScoringWeights {
            fusion_vector: 0.5,
            fusion_keyword: 0.5,
            ..ScoringWeights::default()
        };
        let fused = fuse(vec![v(1, 0.4)], vec![k(1, 0.8)], 5, &w);
        assert!(close(fused[0].score(), 0.6));
    }
}
