//! In-memory doubles for the store and model capabilities.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::knowledge::{Category, KnowledgeEntry};
use crate::llm::{EmbeddingProvider, GenerationConfig, LanguageModel, ModelError};
use crate::pipeline::Collaborators;
use crate::store::{
    AnalyticsEvent, CachedEmbedding, ConversationLog, ConversationRecord, EmbeddingCacheStore,
    KnowledgeStore, NewKnowledgeEntry, StoreError,
};

pub(crate) fn entry(
    id: i32,
    category: Category,
    title: &str,
    content: &str,
    priority: i32,
) -> KnowledgeEntry {
    KnowledgeEntry {
        id,
        category,
        title: title.to_string(),
        content: content.to_string(),
        keywords: Vec::new(),
        priority,
        is_active: true,
    }
}

fn by_priority(mut entries: Vec<KnowledgeEntry>) -> Vec<KnowledgeEntry> {
    entries.sort_by(|a, b| b.priority.cmp(&a.priority));
    entries
}

#[derive(Default)]
pub(crate) struct InMemoryStore {
    entries: Mutex<Vec<KnowledgeEntry>>,
    embeddings: Mutex<HashMap<i32, Vec<f32>>>,
    cache: Mutex<HashMap<String, CachedEmbedding>>,
    messages: Mutex<Vec<ConversationRecord>>,
    events: Mutex<Vec<AnalyticsEvent>>,
    embeddings_down: AtomicBool,
    searches_down: AtomicBool,
}

impl InMemoryStore {
    pub(crate) fn with_entries(entries: Vec<KnowledgeEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    /// Make `entries_with_embeddings` fail from now on.
    pub(crate) fn fail_embeddings(&self) {
        self.embeddings_down.store(true, Ordering::SeqCst);
    }

    /// Make category listing and content search fail from now on.
    pub(crate) fn fail_searches(&self) {
        self.searches_down.store(true, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return unavailable();
        }
        Ok(())
    }

    pub(crate) fn seed_embedding(&self, knowledge_id: i32, vector: Vec<f32>) {
        self.embeddings.lock().unwrap().insert(knowledge_id, vector);
    }

    pub(crate) fn seed_cache(&self, row: CachedEmbedding) {
        self.cache.lock().unwrap().insert(row.text_hash.clone(), row);
    }

    pub(crate) fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub(crate) fn cache_row(&self, hash: &str) -> Option<CachedEmbedding> {
        self.cache.lock().unwrap().get(hash).cloned()
    }

    pub(crate) fn messages(&self) -> Vec<ConversationRecord> {
        self.messages.lock().unwrap().clone()
    }

    pub(crate) fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().unwrap().clone()
    }

    fn active(&self) -> Vec<KnowledgeEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.is_active)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn active_entries(&self) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let mut entries = self.active();
        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.category.cmp(&b.category)));
        Ok(entries)
    }

    async fn entries_in_category(
        &self,
        category: Category,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.check(&self.searches_down)?;
        Ok(by_priority(
            self.active().into_iter().filter(|e| e.category == category).collect(),
        ))
    }

    async fn search_content(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.check(&self.searches_down)?;
        let matches = |e: &KnowledgeEntry| {
            let haystacks = [
                e.content.to_lowercase(),
                e.keywords.join(",").to_lowercase(),
                e.title.to_lowercase(),
            ];
            terms
                .iter()
                .any(|t| haystacks.iter().any(|h| h.contains(&t.to_lowercase())))
        };
        let mut hits = by_priority(self.active().into_iter().filter(|e| matches(e)).collect());
        hits.truncate(limit);
        Ok(hits)
    }

    async fn top_by_priority(&self, limit: usize) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let mut entries = by_priority(self.active());
        entries.truncate(limit);
        Ok(entries)
    }

    async fn entries_with_embeddings(
        &self,
    ) -> Result<Vec<(KnowledgeEntry, Vec<f32>)>, StoreError> {
        self.check(&self.embeddings_down)?;
        let embeddings = self.embeddings.lock().unwrap().clone();
        Ok(self
            .active()
            .into_iter()
            .filter_map(|e| embeddings.get(&e.id).cloned().map(|v| (e, v)))
            .collect())
    }

    async fn entries_missing_embedding(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let embeddings = self.embeddings.lock().unwrap().clone();
        let mut missing = by_priority(
            self.active()
                .into_iter()
                .filter(|e| !embeddings.contains_key(&e.id))
                .collect(),
        );
        if let Some(limit) = limit {
            missing.truncate(limit);
        }
        Ok(missing)
    }

    async fn upsert_knowledge_embedding(
        &self,
        knowledge_id: i32,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        self.seed_embedding(knowledge_id, vector.to_vec());
        Ok(())
    }

    async fn insert_entry(&self, new: NewKnowledgeEntry) -> Result<i32, StoreError> {
        let mut entries = self.entries.lock().unwrap();
        let id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        entries.push(KnowledgeEntry {
            id,
            category: new.category,
            title: new.title,
            content: new.content,
            keywords: new.keywords,
            priority: new.priority,
            is_active: new.is_active,
        });
        Ok(id)
    }
}

#[async_trait]
impl EmbeddingCacheStore for InMemoryStore {
    async fn cached_embedding(
        &self,
        text_hash: &str,
    ) -> Result<Option<CachedEmbedding>, StoreError> {
        Ok(self.cache_row(text_hash))
    }

    async fn put_cached_embedding(&self, entry: CachedEmbedding) -> Result<(), StoreError> {
        self.seed_cache(entry);
        Ok(())
    }
}

#[async_trait]
impl ConversationLog for InMemoryStore {
    async fn append_message(&self, record: ConversationRecord) -> Result<(), StoreError> {
        self.messages.lock().unwrap().push(record);
        Ok(())
    }

    async fn record_event(&self, event: AnalyticsEvent) -> Result<(), StoreError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Wire one in-memory store into every store role.
pub(crate) fn collaborators(
    store: Arc<InMemoryStore>,
    model: Arc<dyn LanguageModel>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Collaborators {
    Collaborators {
        knowledge: store.clone(),
        cache: store.clone(),
        conversations: store,
        model,
        embedder,
    }
}

/// A store whose every operation fails.
pub(crate) struct FailingStore;

fn unavailable<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("test store is down".to_string()))
}

#[async_trait]
impl KnowledgeStore for FailingStore {
    async fn active_entries(&self) -> Result<Vec<KnowledgeEntry>, StoreError> {
        unavailable()
    }

    async fn entries_in_category(&self, _: Category) -> Result<Vec<KnowledgeEntry>, StoreError> {
        unavailable()
    }

    async fn search_content(&self, _: &[String], _: usize) -> Result<Vec<KnowledgeEntry>, StoreError> {
        unavailable()
    }

    async fn top_by_priority(&self, _: usize) -> Result<Vec<KnowledgeEntry>, StoreError> {
        unavailable()
    }

    async fn entries_with_embeddings(&self) -> Result<Vec<(KnowledgeEntry, Vec<f32>)>, StoreError> {
        unavailable()
    }

    async fn entries_missing_embedding(
        &self,
        _: Option<usize>,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        unavailable()
    }

    async fn upsert_knowledge_embedding(&self, _: i32, _: &[f32]) -> Result<(), StoreError> {
        unavailable()
    }

    async fn insert_entry(&self, _: NewKnowledgeEntry) -> Result<i32, StoreError> {
        unavailable()
    }
}

#[async_trait]
impl EmbeddingCacheStore for FailingStore {
    async fn cached_embedding(&self, _: &str) -> Result<Option<CachedEmbedding>, StoreError> {
        unavailable()
    }

    async fn put_cached_embedding(&self, _: CachedEmbedding) -> Result<(), StoreError> {
        unavailable()
    }
}

#[async_trait]
impl ConversationLog for FailingStore {
    async fn append_message(&self, _: ConversationRecord) -> Result<(), StoreError> {
        unavailable()
    }

    async fn record_event(&self, _: AnalyticsEvent) -> Result<(), StoreError> {
        unavailable()
    }
}

/// A language model that replays queued replies and records every prompt.
///
/// Once the queue is empty every call fails with a 503.
#[derive(Default)]
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    prompts: Mutex<Vec<(String, GenerationConfig)>>,
}

impl ScriptedModel {
    pub(crate) fn failing() -> Self {
        Self::default()
    }

    pub(crate) fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    pub(crate) fn push_error(&self, error: ModelError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub(crate) fn configs(&self) -> Vec<GenerationConfig> {
        self.prompts.lock().unwrap().iter().map(|(_, c)| *c).collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push((prompt.to_string(), *config));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ModelError::Status {
                    status: 503,
                    body: "scripted model exhausted".to_string(),
                })
            })
    }
}

type EmbedFn = Box<dyn Fn(&str) -> Option<Vec<f32>> + Send + Sync>;

/// An embedding provider that counts calls.
pub(crate) struct CountingEmbedder {
    embed: EmbedFn,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl CountingEmbedder {
    pub(crate) fn new(embed: impl Fn(&str) -> Option<Vec<f32>> + Send + Sync + 'static) -> Self {
        Self {
            embed: Box::new(embed),
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn constant(vector: Vec<f32>) -> Self {
        Self::new(move |_| Some(vector.clone()))
    }

    pub(crate) fn failing() -> Self {
        Self::new(|_| None)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());
        (self.embed)(text).ok_or(ModelError::Status {
            status: 503,
            body: "embedding unavailable".to_string(),
        })
    }
}
