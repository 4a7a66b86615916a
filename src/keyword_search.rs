//! # Keyword search
//!
//! Two passes over the knowledge store:
//!
//! 1. **Category match.** Every [`Category`] is scored by how many of its
//!    English and Chinese trigger keywords occur in the lowercased query.
//!    The best categories are expanded into their active entries.
//! 2. **Content search.** When the first pass found fewer than `limit`
//!    entries, free-text terms are extracted from the query and matched as
//!    substrings against content, keywords and title.
//!
//! Results are deduplicated by entry id (first occurrence wins), ranked and
//! truncated. Scores are not summed across the two passes; that is fusion's job.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::ScoringWeights;
use crate::knowledge::{Category, ResultSource, SearchResult, sort_by_score_desc};
use crate::store::{KnowledgeStore, StoreError};

static NON_TERM_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^a-zA-Z0-9_\s\x{4e00}-\x{9fff}]").expect("valid term-stripping regex")
});

/// Lowercase, replace punctuation with spaces (CJK ideographs survive), split
/// on whitespace, drop single-character terms, keep at most `max_terms`.
///
/// ```rust
/// use portfolio_assistant::keyword_search::extract_search_terms;
///
/// let terms = extract_search_terms("Where's Yiming's C++ project?", 10);
/// assert_eq!(terms, vec!["where", "yiming", "project"]);
/// ```
pub fn extract_search_terms(query: &str, max_terms: usize) -> Vec<String> {
    let lowered = query.to_lowercase();
    NON_TERM_CHARS
        .replace_all(&lowered, " ")
        .split_whitespace()
        .filter(|term| term.chars().count() > 1)
        .take(max_terms)
        .map(str::to_string)
        .collect()
}

/// Categories whose keywords occur in `query`, best first, at most
/// `weights.top_categories`. Ties keep [`Category::ALL`] order.
pub fn score_categories(query: &str, weights: &ScoringWeights) -> Vec<(Category, f64)> {
    let lowered = query.to_lowercase();
    let hits = |keywords: &[&str]| keywords.iter().filter(|k| lowered.contains(*k)).count() as f64;

    let mut scored: Vec<(Category, f64)> = Category::ALL
        .into_iter()
        .map(|category| {
            let profile = category.profile();
            let score = hits(profile.english_keywords) * weights.english_keyword_hit
                + hits(profile.chinese_keywords) * weights.chinese_keyword_hit;
            (category, score)
        })
        .filter(|(_, score)| *score > 0.0)
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(weights.top_categories);
    scored
}

/// Keep the first result for every entry id.
pub(crate) fn dedupe_by_id(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|result| seen.insert(result.id()))
        .collect()
}

#[derive(Clone)]
pub struct KeywordSearchEngine {
    store: Arc<dyn KnowledgeStore>,
    weights: ScoringWeights,
}

impl KeywordSearchEngine {
    pub fn new(store: Arc<dyn KnowledgeStore>, weights: ScoringWeights) -> Self {
        Self { store, weights }
    }

    /// Rank active entries for `query`.
    ///
    /// # Errors
    /// Store failures propagate; the pipeline owns the degradation policy.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, StoreError> {
        let w = &self.weights;
        let mut results = Vec::new();

        let categories = score_categories(query, w);
        debug!(?categories, "keyword category scores");
        for (category, category_score) in categories {
            for entry in self.store.entries_in_category(category).await? {
                let score =
                    category_score * w.category_match + entry.priority_weight() * w.category_priority;
                results.push(SearchResult::keyword(entry, score, ResultSource::CategoryMatch));
            }
        }

        if results.len() < limit {
            let terms = extract_search_terms(query, w.max_search_terms);
            if !terms.is_empty() {
                for entry in self.store.search_content(&terms, w.content_search_rows).await? {
                    let score = w.content_base + entry.priority_weight() * w.content_priority;
                    results.push(SearchResult::keyword(entry, score, ResultSource::ContentSearch));
                }
            }
        }

        let mut results = dedupe_by_id(results);
        sort_by_score_desc(&mut results);
        results.truncate(limit);
        debug!(count = results.len(), "keyword search done");
        Ok(results)
    }
}
