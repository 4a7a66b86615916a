//! # Response generation
//!
//! Builds a grounded prompt from the ranked results and asks the language
//! model for an answer. Any failure (transport error, timeout, empty output)
//! falls through to [`fallback_response`], so [`ResponseGenerator::generate`]
//! always returns usable text.
//!
//! Prompt layout:
//!
//! ```text
//! <system prompt>
//!
//! <response guidelines>
//!
//! ## User Question: <message>[search context]
//! <numbered knowledge context>
//!
//! ## Instructions:
//! <answer-from-context | acknowledge-missing-information>
//!
//! Please provide a helpful response:
//! ```
//!
//! The knowledge context is cut to `context_max_tokens` (cl100k_base).

use once_cell::sync::Lazy;
use std::{sync::Arc, time::Duration};
use tiktoken_rs::{CoreBPE, cl100k_base};
use tracing::{debug, warn};

use crate::config::Profile;
use crate::fallback::fallback_response;
use crate::knowledge::SearchResult;
use crate::language::Language;
use crate::llm::{GenerationConfig, LanguageModel, with_timeout};

static BPE: Lazy<Option<CoreBPE>> = Lazy::new(|| {
    cl100k_base()
        .map_err(|e| warn!(error = %e, "tokenizer unavailable; context budget disabled"))
        .ok()
});

fn count_tokens(text: &str) -> usize {
    BPE.as_ref()
        .map(|bpe| bpe.encode_with_special_tokens(text).len())
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct ResponseGenerator {
    model: Arc<dyn LanguageModel>,
    profile: Profile,
    relevance_threshold: f64,
    context_max_tokens: usize,
    timeout: Duration,
}

impl ResponseGenerator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        profile: Profile,
        relevance_threshold: f64,
        context_max_tokens: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            profile,
            relevance_threshold,
            context_max_tokens,
            timeout,
        }
    }

    /// Answer `message` from `results`.
    ///
    /// `search_query` is the text retrieval ran on; when it differs from
    /// `message` the prompt says so. Never fails.
    pub async fn generate(
        &self,
        message: &str,
        search_query: &str,
        results: &[SearchResult],
        language: Language,
        session_id: &str,
    ) -> String {
        let prompt = self.build_prompt(message, search_query, results, language);
        debug!(session_id, %language, prompt_tokens = count_tokens(&prompt), "generating answer");

        let reply = with_timeout(
            self.timeout,
            self.model.generate(&prompt, &GenerationConfig::ANSWER),
        )
        .await;
        match reply {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!(session_id, "language model returned empty text; using fallback");
                self.fallback(message, results, language)
            }
            Err(e) => {
                warn!(session_id, error = %e, "language model failed; using fallback");
                self.fallback(message, results, language)
            }
        }
    }

    fn fallback(&self, message: &str, results: &[SearchResult], language: Language) -> String {
        fallback_response(message, results, language, &self.profile, self.relevance_threshold)
    }

    pub fn build_prompt(
        &self,
        message: &str,
        search_query: &str,
        results: &[SearchResult],
        language: Language,
    ) -> String {
        let search_context = if !search_query.is_empty() && search_query != message {
            format!("\n## Search Context: The question was processed as: \"{search_query}\"")
        } else {
            String::new()
        };

        let has_relevant_info = results.iter().any(|r| r.score() > self.relevance_threshold);
        let instruction = if has_relevant_info {
            "Please provide a helpful response based on the available information above.".to_string()
        } else {
            let name = &self.profile.short_name;
            format!(
                "The question asks for specific information that is not available in the knowledge base. \
                 Please politely explain that this specific information is not available and suggest \
                 contacting {name} directly for such details. You can still mention general information \
                 about {name} if relevant."
            )
        };

        format!(
            "{system}\n\n{guidelines}\n\n## User Question: {message}{search_context}\n{context}\n\n\
             ## Instructions:\n{instruction}\n\nPlease provide a helpful response:",
            system = self.system_prompt(language),
            guidelines = self.guidelines(language),
            context = self.knowledge_context(results),
        )
    }

    fn system_prompt(&self, language: Language) -> String {
        let Profile {
            name,
            short_name,
            chinese_name,
        } = &self.profile;
        match language {
            Language::En => format!(
                "You are {name}'s AI assistant. Answer questions about {short_name} professionally and helpfully in English."
            ),
            Language::Zh => format!(
                "你是{chinese_name}({name})的AI助手。请用中文专业、友善地回答关于{chinese_name}的问题。{chinese_name}的英文名是{name}。"
            ),
        }
    }

    fn guidelines(&self, language: Language) -> String {
        let Profile {
            name,
            short_name,
            chinese_name,
        } = &self.profile;
        match language {
            Language::En => format!(
                "Response Guidelines:\n\
                 1. Use the provided relevant information to answer accurately\n\
                 2. Be conversational, friendly, and professional\n\
                 3. If information is incomplete, suggest contacting {short_name} directly\n\
                 4. Focus on the most relevant information based on confidence scores\n\
                 5. Keep responses concise but informative"
            ),
            Language::Zh => format!(
                "回答指南：\n\
                 1. 使用提供的相关信息准确回答问题\n\
                 2. 保持对话式、友好和专业的语调\n\
                 3. 如果信息不完整，建议直接联系{chinese_name}\n\
                 4. 重点关注最相关的信息（根据置信度）\n\
                 5. 保持回答简洁但有用\n\
                 6. 记住{chinese_name}的中文名字是\"{chinese_name}\"，英文名是\"{name}\""
            ),
        }
    }

    /// Numbered context block, cut at the token budget. The first entry is
    /// always kept.
    fn knowledge_context(&self, results: &[SearchResult]) -> String {
        if results.is_empty() {
            return String::new();
        }
        let header = format!("\n## Available Information about {}:\n", self.profile.short_name);
        let mut used = count_tokens(&header);
        let mut items = Vec::with_capacity(results.len());

        for (index, result) in results.iter().enumerate() {
            let item = format!(
                "{}. **{} - {}** (Confidence: {}%)\n   {}\n",
                index + 1,
                result.entry.category.as_str().to_uppercase(),
                result.entry.title,
                result.confidence_percent(),
                result.entry.content,
            );
            let cost = count_tokens(&item) + 1;
            if !items.is_empty() && used + cost > self.context_max_tokens {
                debug!(kept = items.len(), dropped = results.len() - items.len(), "context budget reached");
                break;
            }
            used += cost;
            items.push(item);
        }

        header + &items.join("\n")
    }
}
