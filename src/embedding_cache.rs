//! # Embedding cache
//!
//! Content-addressed embeddings: `sha256(text)` keys a stored vector, valid for
//! `cache_max_age_days`. Search never calls the [`EmbeddingProvider`] directly;
//! it goes through [`EmbeddingCache::get_or_create`].
//!
//! A failed provider call returns `None` and writes nothing, so an outage
//! cannot leave a poisoned row behind.
//!
//! The same type drives knowledge-embedding backfill ([`EmbeddingCache::backfill`]),
//! used lazily on the request path (small batch) and in bulk by the
//! `/embeddings/generate` route and the `embed` command.

use chrono::{Duration as AgeLimit, Utc};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::knowledge::KnowledgeEntry;
use crate::llm::{EmbeddingProvider, with_timeout};
use crate::store::{CachedEmbedding, EmbeddingCacheStore, KnowledgeStore, StoreError};

/// Stable content hash used as the cache key.
pub fn content_hash(text: &str) -> String {
    sha256::digest(text)
}

/// Outcome of one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Entries found without an embedding.
    pub attempted: usize,
    pub stored: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct EmbeddingCache {
    store: Arc<dyn EmbeddingCacheStore>,
    provider: Arc<dyn EmbeddingProvider>,
    max_age: AgeLimit,
    timeout: Duration,
}

impl EmbeddingCache {
    pub fn new(
        store: Arc<dyn EmbeddingCacheStore>,
        provider: Arc<dyn EmbeddingProvider>,
        max_age_days: i64,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            max_age: AgeLimit::days(max_age_days),
            timeout,
        }
    }

    /// Cached vector for `text`, computing and storing it on a miss.
    ///
    /// Returns `None` when the provider fails or times out. Cache read and
    /// write failures are logged; a read failure is treated as a miss.
    pub async fn get_or_create(&self, text: &str) -> Option<Vec<f32>> {
        let hash = content_hash(text);

        match self.store.cached_embedding(&hash).await {
            Ok(Some(hit)) if Utc::now() - hit.created_at < self.max_age => {
                debug!(hash = %hash, "embedding cache hit");
                return Some(hit.vector);
            }
            Ok(Some(_)) => debug!(hash = %hash, "embedding cache entry stale"),
            Ok(None) => debug!(hash = %hash, "embedding cache miss"),
            Err(e) => warn!(hash = %hash, error = %e, "embedding cache read failed"),
        }

        let vector = match with_timeout(self.timeout, self.provider.embed(text)).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "embedding provider failed");
                return None;
            }
        };

        let row = CachedEmbedding {
            text_hash: hash,
            text_snippet: text.chars().take(100).collect(),
            vector: vector.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.put_cached_embedding(row).await {
            warn!(error = %e, "embedding cache write failed");
        }
        Some(vector)
    }

    /// Embed active entries that have no embedding yet.
    ///
    /// `limit` bounds the batch (`None` = all). `progress` is called after each
    /// entry with `(done, total)`. Only listing the missing entries can fail;
    /// per-entry failures are counted and skipped.
    pub async fn backfill<P>(
        &self,
        knowledge: &dyn KnowledgeStore,
        limit: Option<usize>,
        progress: P,
    ) -> Result<BackfillReport, StoreError>
    where
        P: FnMut(usize, usize) + Send,
    {
        self.run_backfill(knowledge, limit, false, progress).await
    }

    /// Request-path backfill of at most `batch` entries that gives up on the
    /// first failed entry, so an unavailable provider costs one call.
    pub async fn lazy_backfill(
        &self,
        knowledge: &dyn KnowledgeStore,
        batch: usize,
    ) -> Result<BackfillReport, StoreError> {
        self.run_backfill(knowledge, Some(batch), true, |_, _| {}).await
    }

    async fn run_backfill<P>(
        &self,
        knowledge: &dyn KnowledgeStore,
        limit: Option<usize>,
        stop_on_failure: bool,
        mut progress: P,
    ) -> Result<BackfillReport, StoreError>
    where
        P: FnMut(usize, usize) + Send,
    {
        let missing = knowledge.entries_missing_embedding(limit).await?;
        let mut report = BackfillReport {
            attempted: missing.len(),
            ..BackfillReport::default()
        };
        if missing.is_empty() {
            return Ok(report);
        }

        for (done, entry) in missing.iter().enumerate() {
            if self.embed_entry(knowledge, entry).await {
                report.stored += 1;
            } else {
                report.failed += 1;
                if stop_on_failure {
                    warn!(remaining = report.attempted - done - 1, "embedding backfill stopped early");
                    break;
                }
            }
            progress(done + 1, report.attempted);
        }

        info!(
            attempted = report.attempted,
            stored = report.stored,
            failed = report.failed,
            "embedding backfill finished"
        );
        Ok(report)
    }

    async fn embed_entry(&self, knowledge: &dyn KnowledgeStore, entry: &KnowledgeEntry) -> bool {
        let Some(vector) = self.get_or_create(&entry.embedding_text()).await else {
            return false;
        };
        match knowledge.upsert_knowledge_embedding(entry.id, &vector).await {
            Ok(()) => true,
            Err(e) => {
                warn!(knowledge_id = entry.id, error = %e, "storing knowledge embedding failed");
                false
            }
        }
    }
}
