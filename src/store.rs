//! # Store
//!
//! The persistence collaborators the pipeline talks to, and a SQLite
//! implementation built on Diesel.
//!
//! Three traits split the surface by concern:
//!
//! - [`KnowledgeStore`]: read knowledge entries, maintain their embeddings.
//! - [`EmbeddingCacheStore`]: content-addressed embedding cache rows.
//! - [`ConversationLog`]: append-only exchange log plus analytics events.
//!
//! [`SqliteStore`] implements all three. Each call opens its own connection on
//! the blocking pool, so the async request path never waits on disk I/O and
//! concurrent requests do not share connection state. Writes to embeddings
//! and the cache are `REPLACE INTO` upserts: last writer wins.
//!
//! ```no_run
//! use portfolio_assistant::store::{KnowledgeStore, SqliteStore};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("portfolio.db").await?;
//! for entry in store.active_entries().await? {
//!     println!("{} / {}", entry.category, entry.title);
//! }
//! # Ok(()) }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::knowledge::{Category, KnowledgeEntry};
use crate::models::{
    AnalyticsRow, ConversationRow, EmbeddingCacheRow, KnowledgeEmbeddingRow, KnowledgeRow,
    NewKnowledgeRow, join_keywords,
};
use crate::schema::{
    chat_analytics, conversations, embedding_cache, knowledge_base, knowledge_embeddings,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("stored vector is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A knowledge entry to be inserted (import / seeding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewKnowledgeEntry {
    pub category: Category,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_priority() -> i32 {
    5
}

fn default_active() -> bool {
    true
}

/// An embedding cache row in domain form.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEmbedding {
    pub text_hash: String,
    pub text_snippet: String,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRecord {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsEvent {
    pub session_id: String,
    pub event_type: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Read access to knowledge entries plus embedding maintenance.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Every active entry, priority descending then category ascending.
    async fn active_entries(&self) -> Result<Vec<KnowledgeEntry>, StoreError>;

    /// Active entries of one category, priority descending.
    async fn entries_in_category(&self, category: Category)
    -> Result<Vec<KnowledgeEntry>, StoreError>;

    /// Active entries whose content, keywords or title contain any of `terms`
    /// (case-insensitive for ASCII), priority descending, at most `limit`.
    async fn search_content(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>, StoreError>;

    /// The `limit` highest-priority active entries.
    async fn top_by_priority(&self, limit: usize) -> Result<Vec<KnowledgeEntry>, StoreError>;

    /// Active entries that have an embedding, paired with it.
    async fn entries_with_embeddings(&self)
    -> Result<Vec<(KnowledgeEntry, Vec<f32>)>, StoreError>;

    /// Active entries without an embedding, at most `limit` when given.
    async fn entries_missing_embedding(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<KnowledgeEntry>, StoreError>;

    /// Insert or replace the embedding of one entry.
    async fn upsert_knowledge_embedding(
        &self,
        knowledge_id: i32,
        vector: &[f32],
    ) -> Result<(), StoreError>;

    /// Insert a new entry and return its id.
    async fn insert_entry(&self, entry: NewKnowledgeEntry) -> Result<i32, StoreError>;
}

/// Content-addressed embedding cache rows.
#[async_trait]
pub trait EmbeddingCacheStore: Send + Sync {
    async fn cached_embedding(&self, text_hash: &str)
    -> Result<Option<CachedEmbedding>, StoreError>;

    /// Insert or replace the row for `entry.text_hash`.
    async fn put_cached_embedding(&self, entry: CachedEmbedding) -> Result<(), StoreError>;
}

/// Append-only conversation log.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn append_message(&self, record: ConversationRecord) -> Result<(), StoreError>;

    async fn record_event(&self, event: AnalyticsEvent) -> Result<(), StoreError>;
}

/// Knowledge file written by `folio init`.
pub const SAMPLE_KNOWLEDGE: &str = r#"# Curated facts the assistant answers from.
# category: personal | education | experience | projects | skills | awards |
#           contact | languages | interests | current_status | career
- category: personal
  title: Introduction
  content: Yiming Li is a software engineer working on robotics and machine learning systems.
  keywords: [introduction, about]
  priority: 9
- category: education
  title: Master's degree
  content: Master's degree from EIT Digital Master School.
  keywords: [master, eit]
  priority: 8
- category: skills
  title: Programming languages
  content: Rust, Python and C++.
  priority: 6
- category: contact
  title: Contact
  content: Reach out through the contact form on this website.
  priority: 5
"#;

/// Parse a YAML list of entries and insert them in file order.
///
/// Returns the new ids. Stops at the first failed insert.
pub async fn import_knowledge(
    store: &dyn KnowledgeStore,
    yaml: &str,
) -> Result<Vec<i32>, Box<dyn std::error::Error>> {
    let entries: Vec<NewKnowledgeEntry> = serde_yaml::from_str(yaml)?;
    let mut ids = Vec::with_capacity(entries.len());
    for entry in entries {
        let title = entry.title.clone();
        let id = store.insert_entry(entry).await?;
        debug!(knowledge_id = id, title = %title, "imported knowledge entry");
        ids.push(id);
    }
    Ok(ids)
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS knowledge_base (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    category TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    keywords TEXT NOT NULL DEFAULT '',
    priority INTEGER NOT NULL DEFAULT 0,
    is_active BOOLEAN NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_knowledge_base_category ON knowledge_base (category);
CREATE TABLE IF NOT EXISTS knowledge_embeddings (
    knowledge_id INTEGER PRIMARY KEY NOT NULL REFERENCES knowledge_base (id),
    embedding TEXT NOT NULL,
    created_at BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS embedding_cache (
    text_hash TEXT PRIMARY KEY NOT NULL,
    text_snippet TEXT NOT NULL,
    embedding TEXT NOT NULL,
    created_at BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at BIGINT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversations_session ON conversations (session_id);
CREATE TABLE IF NOT EXISTS chat_analytics (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    session_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    event_data TEXT NOT NULL,
    created_at BIGINT NOT NULL
);
"#;

/// Open a SQLite connection with a busy timeout so concurrent writers wait
/// instead of failing with `SQLITE_BUSY`.
pub fn establish_connection(db_url: &str) -> Result<SqliteConnection, StoreError> {
    let mut connection = SqliteConnection::establish(db_url)?;
    connection.batch_execute("PRAGMA busy_timeout = 5000;")?;
    Ok(connection)
}

/// Diesel/SQLite implementation of every store trait.
///
/// `database_url` must name a file: each operation opens a fresh connection,
/// so `:memory:` would give every call its own empty database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    database_url: String,
}

type EntryPredicate = Box<dyn BoxableExpression<knowledge_base::table, Sqlite, SqlType = Bool>>;

/// `%term%` with LIKE wildcards in `term` matched literally (escape `\`).
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn term_predicate(term: &str) -> EntryPredicate {
    let pattern = like_pattern(term);
    Box::new(
        knowledge_base::content
            .like(pattern.clone())
            .escape('\\')
            .or(knowledge_base::keywords.like(pattern.clone()).escape('\\'))
            .or(knowledge_base::title.like(pattern).escape('\\')),
    )
}

/// Convert rows, dropping (and logging) rows with an unknown category.
fn into_entries(rows: Vec<KnowledgeRow>) -> Vec<KnowledgeEntry> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            row.into_entry()
                .map_err(|e| warn!(knowledge_id = id, error = %e, "skipping knowledge row"))
                .ok()
        })
        .collect()
}

fn to_timestamp(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::UNIX_EPOCH)
}

fn snippet(text: &str) -> String {
    text.chars().take(100).collect()
}

impl SqliteStore {
    /// Open (and if needed create) the database at `database_url`.
    ///
    /// # Errors
    /// Connection or DDL failures.
    pub async fn open(database_url: impl Into<String>) -> Result<Self, StoreError> {
        let store = Self {
            database_url: database_url.into(),
        };
        store
            .run(|conn| {
                conn.batch_execute(SCHEMA)?;
                Ok(())
            })
            .await?;
        debug!(database_url = %store.database_url, "sqlite store ready");
        Ok(store)
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Run `op` against a fresh connection on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let url = self.database_url.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&url)?;
            op(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn active_entries(&self) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.run(|conn| {
            let rows = knowledge_base::table
                .filter(knowledge_base::is_active.eq(true))
                .order((knowledge_base::priority.desc(), knowledge_base::category.asc()))
                .select(KnowledgeRow::as_select())
                .load(conn)?;
            Ok(into_entries(rows))
        })
        .await
    }

    async fn entries_in_category(
        &self,
        category: Category,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.run(move |conn| {
            let rows = knowledge_base::table
                .filter(knowledge_base::is_active.eq(true))
                .filter(knowledge_base::category.eq(category.as_str()))
                .order(knowledge_base::priority.desc())
                .select(KnowledgeRow::as_select())
                .load(conn)?;
            Ok(into_entries(rows))
        })
        .await
    }

    async fn search_content(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let terms = terms.to_vec();
        self.run(move |conn| {
            let mut query = knowledge_base::table
                .filter(knowledge_base::is_active.eq(true))
                .into_boxed();
            if let Some(predicate) = terms
                .iter()
                .map(|term| term_predicate(term))
                .reduce(|acc, next| -> EntryPredicate { Box::new(acc.or(next)) })
            {
                query = query.filter(predicate);
            }
            let rows = query
                .order(knowledge_base::priority.desc())
                .limit(limit as i64)
                .select(KnowledgeRow::as_select())
                .load(conn)?;
            Ok(into_entries(rows))
        })
        .await
    }

    async fn top_by_priority(&self, limit: usize) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.run(move |conn| {
            let rows = knowledge_base::table
                .filter(knowledge_base::is_active.eq(true))
                .order(knowledge_base::priority.desc())
                .limit(limit as i64)
                .select(KnowledgeRow::as_select())
                .load(conn)?;
            Ok(into_entries(rows))
        })
        .await
    }

    async fn entries_with_embeddings(
        &self,
    ) -> Result<Vec<(KnowledgeEntry, Vec<f32>)>, StoreError> {
        self.run(|conn| {
            let rows: Vec<(KnowledgeRow, String)> = knowledge_base::table
                .inner_join(knowledge_embeddings::table)
                .filter(knowledge_base::is_active.eq(true))
                .select((KnowledgeRow::as_select(), knowledge_embeddings::embedding))
                .load(conn)?;

            let mut out = Vec::with_capacity(rows.len());
            for (row, raw) in rows {
                let id = row.id;
                let vector: Vec<f32> = match serde_json::from_str(&raw) {
                    Ok(vector) => vector,
                    Err(e) => {
                        warn!(knowledge_id = id, error = %e, "skipping malformed embedding");
                        continue;
                    }
                };
                match row.into_entry() {
                    Ok(entry) => out.push((entry, vector)),
                    Err(e) => warn!(knowledge_id = id, error = %e, "skipping knowledge row"),
                }
            }
            Ok(out)
        })
        .await
    }

    async fn entries_missing_embedding(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.run(move |conn| {
            let mut query = knowledge_base::table
                .left_join(knowledge_embeddings::table)
                .filter(knowledge_embeddings::knowledge_id.is_null())
                .filter(knowledge_base::is_active.eq(true))
                .order(knowledge_base::priority.desc())
                .select(KnowledgeRow::as_select())
                .into_boxed();
            if let Some(limit) = limit {
                query = query.limit(limit as i64);
            }
            Ok(into_entries(query.load(conn)?))
        })
        .await
    }

    async fn upsert_knowledge_embedding(
        &self,
        knowledge_id: i32,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        let row = KnowledgeEmbeddingRow {
            knowledge_id,
            embedding: serde_json::to_string(vector)?,
            created_at: to_timestamp(Utc::now()),
        };
        self.run(move |conn| {
            diesel::replace_into(knowledge_embeddings::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn insert_entry(&self, entry: NewKnowledgeEntry) -> Result<i32, StoreError> {
        let row = NewKnowledgeRow {
            category: entry.category.as_str().to_string(),
            title: entry.title,
            content: entry.content,
            keywords: join_keywords(&entry.keywords),
            priority: entry.priority,
            is_active: entry.is_active,
        };
        self.run(move |conn| {
            let id = diesel::insert_into(knowledge_base::table)
                .values(&row)
                .returning(knowledge_base::id)
                .get_result::<i32>(conn)?;
            Ok(id)
        })
        .await
    }
}

#[async_trait]
impl EmbeddingCacheStore for SqliteStore {
    async fn cached_embedding(
        &self,
        text_hash: &str,
    ) -> Result<Option<CachedEmbedding>, StoreError> {
        let text_hash = text_hash.to_string();
        self.run(move |conn| {
            let row = embedding_cache::table
                .find(&text_hash)
                .select(EmbeddingCacheRow::as_select())
                .first(conn)
                .optional()?;
            let Some(row) = row else {
                return Ok(None);
            };
            Ok(Some(CachedEmbedding {
                vector: serde_json::from_str(&row.embedding)?,
                text_hash: row.text_hash,
                text_snippet: row.text_snippet,
                created_at: from_timestamp(row.created_at),
            }))
        })
        .await
    }

    async fn put_cached_embedding(&self, entry: CachedEmbedding) -> Result<(), StoreError> {
        let row = EmbeddingCacheRow {
            embedding: serde_json::to_string(&entry.vector)?,
            text_snippet: snippet(&entry.text_snippet),
            text_hash: entry.text_hash,
            created_at: to_timestamp(entry.created_at),
        };
        self.run(move |conn| {
            diesel::replace_into(embedding_cache::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ConversationLog for SqliteStore {
    async fn append_message(&self, record: ConversationRecord) -> Result<(), StoreError> {
        let row = ConversationRow {
            session_id: record.session_id,
            role: record.role.as_str().to_string(),
            content: record.content,
            created_at: to_timestamp(record.created_at),
        };
        self.run(move |conn| {
            diesel::insert_into(conversations::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn record_event(&self, event: AnalyticsEvent) -> Result<(), StoreError> {
        let row = AnalyticsRow {
            session_id: event.session_id,
            event_type: event.event_type,
            event_data: event.data.to_string(),
            created_at: to_timestamp(event.created_at),
        };
        self.run(move |conn| {
            diesel::insert_into(chat_analytics::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
