//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the [`PortfolioConfig`] struct and its sections, and a [`load_config`]
//! function to load the configuration from a YAML file. Every section has serde
//! defaults, so a file only needs the keys it wants to change.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use portfolio_assistant::config::{PortfolioConfig, load_config};
//!
//! let config: PortfolioConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config.provider.kind);
//! ```
//!
//! A minimal file:
//!
//! ```yaml
//! database_url: "portfolio.db"
//! provider:
//!   kind: gemini
//!   api_key: "CHANGEME"
//! profile:
//!   name: "Yiming Li"
//!   short_name: "Yiming"
//!   chinese_name: "李一鸣"
//! ```

use serde::{Deserialize, Serialize};
use std::{error::Error, fs, time::Duration};

use crate::language::Language;

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct PortfolioConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,

    /// SQLite database path or URL holding knowledge, embeddings and conversations.
    pub database_url: String,

    /// Hosted language-model / embedding provider.
    pub provider: ProviderConfig,

    /// The person the assistant answers questions about.
    pub profile: Profile,

    /// Retrieval and ranking knobs.
    pub retrieval: RetrievalSettings,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:8787`.
    pub bind_address: String,

    /// Allowed CORS origins. Empty means permissive.
    pub cors_origins: Vec<String>,

    /// Include error details in 500 responses.
    pub expose_error_details: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8787".to_string(),
            cors_origins: Vec::new(),
            expose_error_details: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Generative Language REST API.
    #[default]
    Gemini,
    /// Any OpenAI-compatible `/v1` endpoint.
    OpenAi,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// The API key used to authenticate requests to the API.
    pub api_key: String,

    /// The base URL of the API. Empty selects the provider's public endpoint.
    pub api_base: String,

    /// Model used for answers and translation.
    pub chat_model: String,

    /// Model used for embeddings.
    pub embedding_model: String,

    /// Upper bound for any single provider call.
    pub request_timeout_secs: u64,
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `api_base`, or the default endpoint for `kind`.
    pub fn effective_api_base(&self) -> String {
        if !self.api_base.trim().is_empty() {
            return self.api_base.trim_end_matches('/').to_string();
        }
        match self.kind {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta".to_string(),
            ProviderKind::OpenAi => "https://api.openai.com/v1".to_string(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Gemini,
            api_key: String::new(),
            api_base: String::new(),
            chat_model: "gemini-2.0-flash-exp".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Names substituted into prompts and templated answers.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub short_name: String,
    pub chinese_name: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: "Yiming Li".to_string(),
            short_name: "Yiming".to_string(),
            chinese_name: "李一鸣".to_string(),
        }
    }
}

impl Profile {
    /// The name to use when speaking `language`.
    pub fn display_name(&self, language: Language) -> &str {
        match language {
            Language::En => &self.short_name,
            Language::Zh => &self.chinese_name,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Ranked results handed to the response generator.
    pub limit: usize,

    /// Results echoed back to the client as `relevantSources`.
    pub sources_in_response: usize,

    /// Primary language of the knowledge base.
    pub knowledge_language: Language,

    /// Translate Chinese queries before searching an English knowledge base.
    pub translate_queries: bool,

    /// Backfill missing knowledge embeddings on the request path.
    pub lazy_backfill: bool,

    /// Entries backfilled per request.
    pub backfill_batch_size: usize,

    /// Token budget for the knowledge context block in the prompt.
    pub context_max_tokens: usize,

    /// Embedding cache staleness threshold.
    pub cache_max_age_days: i64,

    pub weights: ScoringWeights,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            limit: 6,
            sources_in_response: 3,
            knowledge_language: Language::En,
            translate_queries: true,
            lazy_backfill: true,
            backfill_batch_size: 10,
            context_max_tokens: 2048,
            cache_max_age_days: 7,
            weights: ScoringWeights::default(),
        }
    }
}

/// Empirically chosen ranking constants.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct ScoringWeights {
    /// Minimum cosine similarity for a vector hit, and the "has relevant info" bar.
    pub relevance_threshold: f64,
    pub vector_similarity: f64,
    pub vector_priority: f64,
    pub category_match: f64,
    pub category_priority: f64,
    pub content_base: f64,
    pub content_priority: f64,
    pub fusion_vector: f64,
    pub fusion_keyword: f64,
    pub english_keyword_hit: f64,
    pub chinese_keyword_hit: f64,
    /// How many top-scoring categories are expanded into results.
    pub top_categories: usize,
    /// Cap on extracted free-text search terms.
    pub max_search_terms: usize,
    /// Cap on rows returned by the substring search.
    pub content_search_rows: usize,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.3,
            vector_similarity: 0.9,
            vector_priority: 0.1,
            category_match: 0.8,
            category_priority: 0.2,
            content_base: 0.6,
            content_priority: 0.1,
            fusion_vector: 0.6,
            fusion_keyword: 0.4,
            english_keyword_hit: 1.0,
            chinese_keyword_hit: 1.1,
            top_categories: 3,
            max_search_terms: 10,
            content_search_rows: 10,
        }
    }
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database_url: "portfolio.db".to_string(),
            provider: ProviderConfig::default(),
            profile: Profile::default(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Parameters
///
/// - `file`: The path to the YAML configuration file.
///
/// # Returns
///
/// - `Ok(PortfolioConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or parsing the YAML.
pub fn load_config(file: &str) -> Result<PortfolioConfig, Box<dyn Error>> {
    tracing::debug!(path = file, "loading config");
    let content = fs::read_to_string(file)?;
    let config: PortfolioConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}
