//! # Chat pipeline
//!
//! One request, end to end:
//!
//! ```text
//! message ─▶ resolve language ─▶ (translate zh→en) ─▶ ┌ keyword search ┐ ─▶ fuse ─▶ generate ─▶ reply
//!                                                     └ vector search  ┘
//! ```
//!
//! Keyword and vector search run concurrently and are joined before fusion.
//! Retrieval degrades in steps: hybrid, then keyword only, then the
//! highest-priority entries, then nothing. Generation degrades to the fallback
//! ladder. Recording the exchange is spawned and never awaited.
//!
//! The pipeline holds no per-request state; every collaborator is injected
//! through [`Collaborators`] and shared behind `Arc`.

use chrono::Utc;
use serde_json::json;
use std::{error::Error, sync::Arc, time::Instant};
use tracing::{debug, info, warn};

use crate::config::{PortfolioConfig, RetrievalSettings};
use crate::embedding_cache::{BackfillReport, EmbeddingCache};
use crate::fusion::fuse;
use crate::keyword_search::KeywordSearchEngine;
use crate::knowledge::{KnowledgeEntry, ResultSource, SearchResult};
use crate::language::{self, Language};
use crate::llm::{EmbeddingProvider, LanguageModel, build_backends};
use crate::response::ResponseGenerator;
use crate::store::{
    AnalyticsEvent, ConversationLog, ConversationRecord, EmbeddingCacheStore, KnowledgeStore,
    Role, SqliteStore, StoreError,
};
use crate::translator::QueryTranslator;
use crate::vector_search::VectorSearchEngine;

const ANONYMOUS_SESSION: &str = "anonymous";
const PRIORITY_FALLBACK_SCORE: f64 = 0.5;

/// Everything the pipeline talks to outside the process.
#[derive(Clone)]
pub struct Collaborators {
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub cache: Arc<dyn EmbeddingCacheStore>,
    pub conversations: Arc<dyn ConversationLog>,
    pub model: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

impl Collaborators {
    /// SQLite for every store role and the configured provider for both model roles.
    pub async fn from_config(config: &PortfolioConfig) -> Result<Self, Box<dyn Error>> {
        let store = Arc::new(SqliteStore::open(config.database_url.clone()).await?);
        let (model, embedder) = build_backends(&config.provider)?;
        Ok(Self {
            knowledge: store.clone(),
            cache: store.clone(),
            conversations: store,
            model,
            embedder,
        })
    }
}

/// A chat request as the HTTP layer hands it over.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
    /// `"auto"`, `"en"` or `"zh"`.
    pub language: Option<String>,
    pub force_language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: String,
    /// Response language.
    pub language: Language,
    /// The text retrieval ran on (the translation, when one was made).
    pub search_query: String,
    /// Ranked results handed to the generator.
    pub results: Vec<SearchResult>,
    pub processing_time_ms: u64,
}

#[derive(Clone)]
pub struct ChatPipeline {
    knowledge: Arc<dyn KnowledgeStore>,
    conversations: Arc<dyn ConversationLog>,
    cache: EmbeddingCache,
    keyword: KeywordSearchEngine,
    vector: VectorSearchEngine,
    translator: QueryTranslator,
    generator: ResponseGenerator,
    settings: RetrievalSettings,
}

impl ChatPipeline {
    pub fn new(collaborators: Collaborators, config: &PortfolioConfig) -> Self {
        let Collaborators {
            knowledge,
            cache,
            conversations,
            model,
            embedder,
        } = collaborators;
        let settings = config.retrieval.clone();
        let timeout = config.provider.request_timeout();

        Self {
            cache: EmbeddingCache::new(cache, embedder, settings.cache_max_age_days, timeout),
            keyword: KeywordSearchEngine::new(knowledge.clone(), settings.weights.clone()),
            vector: VectorSearchEngine::new(knowledge.clone(), settings.weights.clone()),
            translator: QueryTranslator::new(model.clone(), config.profile.name.clone(), timeout),
            generator: ResponseGenerator::new(
                model,
                config.profile.clone(),
                settings.weights.relevance_threshold,
                settings.context_max_tokens,
                timeout,
            ),
            knowledge,
            conversations,
            settings,
        }
    }

    /// Answer one chat message. Never fails; the caller validates input.
    pub async fn handle(&self, request: &ChatRequest) -> ChatOutcome {
        let started = Instant::now();
        let message = request.message.trim();
        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(ANONYMOUS_SESSION)
            .to_string();
        let language = language::resolve(
            message,
            request.language.as_deref(),
            request.force_language.as_deref(),
        );
        info!(session_id = %session_id, %language, "chat request");

        let search_query = if self.should_translate(language) {
            self.translator.translate_to_english(message).await
        } else {
            message.to_string()
        };

        let results = self.retrieve(&search_query).await;
        let response = self
            .generator
            .generate(message, &search_query, &results, language, &session_id)
            .await;

        self.record(&session_id, message, &response, language);

        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            session_id = %session_id,
            results = results.len(),
            processing_time_ms,
            "chat answered"
        );
        ChatOutcome {
            response,
            language,
            search_query,
            results,
            processing_time_ms,
        }
    }

    fn should_translate(&self, language: Language) -> bool {
        language == Language::Zh
            && self.settings.translate_queries
            && self.settings.knowledge_language == Language::En
    }

    /// Ranked results for `query`, degrading step by step. Never fails.
    pub async fn retrieve(&self, query: &str) -> Vec<SearchResult> {
        let limit = self.settings.limit;

        match self.hybrid_search(query, limit).await {
            Ok(results) => return results,
            Err(e) => warn!(error = %e, "hybrid search failed; trying keyword search"),
        }

        match self.keyword.search(query, limit).await {
            Ok(results) => return results,
            Err(e) => warn!(error = %e, "keyword search failed; trying priority listing"),
        }

        match self.knowledge.top_by_priority(limit).await {
            Ok(entries) => entries
                .into_iter()
                .map(|entry| SearchResult::keyword(entry, PRIORITY_FALLBACK_SCORE, ResultSource::Fallback))
                .collect(),
            Err(e) => {
                warn!(error = %e, "priority listing failed; answering without knowledge");
                Vec::new()
            }
        }
    }

    async fn hybrid_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, StoreError> {
        let (keyword, vector) = tokio::join!(
            self.keyword.search(query, limit),
            self.vector_branch(query, limit)
        );
        let (keyword, vector) = match (keyword, vector) {
            (Ok(keyword), Ok(vector)) => (keyword, vector),
            // Vector hits survive a keyword read failure.
            (Err(e), Ok(vector)) if !vector.is_empty() => {
                warn!(error = %e, "keyword search failed; fusing vector results only");
                (Vec::new(), vector)
            }
            (Err(e), _) | (_, Err(e)) => return Err(e),
        };
        debug!(keyword = keyword.len(), vector = vector.len(), "fusing results");
        Ok(fuse(vector, keyword, limit, &self.settings.weights))
    }

    async fn vector_branch(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, StoreError> {
        if self.settings.lazy_backfill {
            let batch = self.settings.backfill_batch_size;
            if let Err(e) = self.cache.lazy_backfill(self.knowledge.as_ref(), batch).await {
                warn!(error = %e, "lazy embedding backfill skipped");
            }
        }
        let query_vector = self.cache.get_or_create(query).await;
        self.vector.search(query_vector.as_deref(), limit).await
    }

    /// Embed every active entry that has no embedding yet.
    pub async fn backfill_all<P>(&self, progress: P) -> Result<BackfillReport, StoreError>
    where
        P: FnMut(usize, usize) + Send,
    {
        self.cache.backfill(self.knowledge.as_ref(), None, progress).await
    }

    pub async fn active_knowledge(&self) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.knowledge.active_entries().await
    }

    /// Append the exchange and an analytics event in the background.
    fn record(&self, session_id: &str, message: &str, response: &str, language: Language) {
        let log = self.conversations.clone();
        let now = Utc::now();
        let records = [
            ConversationRecord {
                session_id: session_id.to_string(),
                role: Role::User,
                content: message.to_string(),
                created_at: now,
            },
            ConversationRecord {
                session_id: session_id.to_string(),
                role: Role::Assistant,
                content: response.to_string(),
                created_at: now,
            },
        ];
        let event = AnalyticsEvent {
            session_id: session_id.to_string(),
            event_type: "conversation".to_string(),
            data: json!({ "language": language, "timestamp": now.to_rfc3339() }),
            created_at: now,
        };

        tokio::spawn(async move {
            for record in records {
                if let Err(e) = log.append_message(record).await {
                    warn!(error = %e, "conversation not recorded");
                    return;
                }
            }
            if let Err(e) = log.record_event(event).await {
                warn!(error = %e, "analytics event not recorded");
            }
        });
    }
}
