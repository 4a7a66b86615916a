//! # Database models
//!
//! Data structures that map to the SQLite schema via **Diesel**.
//!
//! - [`KnowledgeRow`] / [`NewKnowledgeRow`]: curated facts (`knowledge_base`).
//! - [`KnowledgeEmbeddingRow`]: one embedding per knowledge entry (`knowledge_embeddings`).
//! - [`EmbeddingCacheRow`]: content-addressed embedding cache (`embedding_cache`).
//! - [`ConversationRow`]: append-only exchange log (`conversations`).
//! - [`AnalyticsRow`]: best-effort chat events (`chat_analytics`).
//!
//! ## Notes
//! - Vectors are stored as JSON arrays in `TEXT` columns.
//! - `keywords` is a single **comma-joined** string; [`KnowledgeRow::into_entry`]
//!   splits it back into a list.
//! - Timestamps are Unix seconds.

use diesel::prelude::*;

use crate::knowledge::{Category, KnowledgeEntry, UnknownCategory};

/// A `knowledge_base` row as stored.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::knowledge_base)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct KnowledgeRow {
    pub id: i32,
    /// One of the [`Category`] wire names.
    pub category: String,
    pub title: String,
    pub content: String,
    /// Comma-joined keyword tags.
    pub keywords: String,
    pub priority: i32,
    pub is_active: bool,
}

impl KnowledgeRow {
    /// Convert into the domain type.
    ///
    /// # Errors
    /// Fails when `category` is not a known [`Category`].
    pub fn into_entry(self) -> Result<KnowledgeEntry, UnknownCategory> {
        let category: Category = self.category.parse()?;
        Ok(KnowledgeEntry {
            id: self.id,
            category,
            title: self.title,
            content: self.content,
            keywords: split_keywords(&self.keywords),
            priority: self.priority,
            is_active: self.is_active,
        })
    }
}

/// Insertable `knowledge_base` row; the id is assigned by SQLite.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::knowledge_base)]
pub struct NewKnowledgeRow {
    pub category: String,
    pub title: String,
    pub content: String,
    pub keywords: String,
    pub priority: i32,
    pub is_active: bool,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::knowledge_embeddings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct KnowledgeEmbeddingRow {
    pub knowledge_id: i32,
    /// JSON array of `f32`.
    pub embedding: String,
    pub created_at: i64,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::embedding_cache)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EmbeddingCacheRow {
    /// SHA-256 hex digest of the source text.
    pub text_hash: String,
    /// First 100 characters of the source text, for diagnostics.
    pub text_snippet: String,
    /// JSON array of `f32`.
    pub embedding: String,
    pub created_at: i64,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::conversations)]
pub struct ConversationRow {
    pub session_id: String,
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
    pub created_at: i64,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::chat_analytics)]
pub struct AnalyticsRow {
    pub session_id: String,
    pub event_type: String,
    /// JSON object.
    pub event_data: String,
    pub created_at: i64,
}

pub(crate) fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn join_keywords(keywords: &[String]) -> String {
    keywords.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_split_and_trim() {
        assert_eq!(split_keywords("eit, master ,,digital"), vec!["eit", "master", "digital"]);
        assert!(split_keywords("").is_empty());
    }

    #[test]
    fn row_with_unknown_category_is_rejected() {
        let row = KnowledgeRow {
            id: 1,
            category: "gossip".into(),
            title: "t".into(),
            content: "c".into(),
            keywords: String::new(),
            priority: 1,
            is_active: true,
        };
        assert!(row.into_entry().is_err());
    }
}
