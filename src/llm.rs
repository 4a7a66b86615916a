//! # Language-model and embedding capabilities
//!
//! The pipeline sees hosted models only through two object-safe traits:
//!
//! - [`LanguageModel`]: prompt in, generated text out, under a [`GenerationConfig`].
//! - [`EmbeddingProvider`]: text in, fixed-length `f32` vector out.
//!
//! Two backends implement both:
//!
//! - [`GeminiClient`] talks to the Google Generative Language REST API with `reqwest`.
//! - [`OpenAiClient`] talks to any OpenAI-compatible `/v1` endpoint: chat through
//!   `async-openai`, embeddings through the plain `/embeddings` route.
//!
//! Callers bound every call with [`with_timeout`]; a timeout surfaces as
//! [`ModelError::Timeout`] and is handled like any other provider failure.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::debug;

use crate::config::{ProviderConfig, ProviderKind};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned no usable output")]
    EmptyOutput,

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider call timed out")]
    Timeout,

    #[error("openai client error: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),
}

/// Sampling configuration for one generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    /// Ignored by backends without a top-k knob.
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    /// Conversational answers.
    pub const ANSWER: GenerationConfig = GenerationConfig {
        temperature: 0.7,
        top_k: 40,
        top_p: 0.95,
        max_output_tokens: 1024,
    };

    /// Short, literal query translation.
    pub const TRANSLATION: GenerationConfig = GenerationConfig {
        temperature: 0.3,
        top_k: 20,
        top_p: 0.8,
        max_output_tokens: 100,
    };
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, ModelError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}

/// Bound `call` by `limit`, mapping elapsed time to [`ModelError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ModelError>
where
    F: Future<Output = Result<T, ModelError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| ModelError::Timeout)?
}

/// Build both capabilities for the configured provider.
///
/// One client serves both roles, so they share a connection pool.
pub fn build_backends(
    config: &ProviderConfig,
) -> Result<(Arc<dyn LanguageModel>, Arc<dyn EmbeddingProvider>), ModelError> {
    match config.kind {
        ProviderKind::Gemini => {
            let client = Arc::new(GeminiClient::from_config(config)?);
            Ok((client.clone(), client))
        }
        ProviderKind::OpenAi => {
            let client = Arc::new(OpenAiClient::from_config(config)?);
            Ok((client.clone(), client))
        }
    }
}

fn http_client(config: &ProviderConfig) -> Result<reqwest::Client, ModelError> {
    Ok(reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?)
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ModelError::Status {
        status: status.as_u16(),
        body,
    })
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerateRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
    safety_settings: [GeminiSafetySetting; 2],
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
    candidate_count: u32,
}

#[derive(Serialize)]
struct GeminiSafetySetting {
    category: &'static str,
    threshold: &'static str,
}

const SAFETY_SETTINGS: [GeminiSafetySetting; 2] = [
    GeminiSafetySetting {
        category: "HARM_CATEGORY_HARASSMENT",
        threshold: "BLOCK_MEDIUM_AND_ABOVE",
    },
    GeminiSafetySetting {
        category: "HARM_CATEGORY_HATE_SPEECH",
        threshold: "BLOCK_MEDIUM_AND_ABOVE",
    },
];

#[derive(Deserialize)]
struct GeminiGenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[derive(Serialize)]
struct GeminiEmbedRequest<'a> {
    model: String,
    content: GeminiContent<'a>,
}

#[derive(Deserialize)]
struct GeminiEmbedResponse {
    embedding: Option<GeminiEmbedding>,
}

#[derive(Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

/// Google Generative Language API client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ModelError> {
        Ok(Self {
            http: http_client(config)?,
            api_base: config.effective_api_base(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.trim_start_matches("models/").to_string(),
            embedding_model: config.embedding_model.trim_start_matches("models/").to_string(),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.api_base)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, ModelError> {
        let body = GeminiGenerateRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: config.temperature,
                top_k: config.top_k,
                top_p: config.top_p,
                max_output_tokens: config.max_output_tokens,
                candidate_count: 1,
            },
            safety_settings: SAFETY_SETTINGS,
        };

        debug!(model = %self.chat_model, prompt_chars = prompt.len(), "gemini generateContent");
        let response = self
            .http
            .post(self.endpoint(&self.chat_model, "generateContent"))
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;
        let parsed: GeminiGenerateResponse = error_for_status(response).await?.json().await?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ModelError::EmptyOutput)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let body = GeminiEmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: GeminiContent {
                parts: vec![GeminiPart { text }],
            },
        };

        let response = self
            .http
            .post(self.endpoint(&self.embedding_model, "embedContent"))
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;
        let parsed: GeminiEmbedResponse = error_for_status(response).await?.json().await?;

        match parsed.embedding {
            Some(embedding) if !embedding.values.is_empty() => Ok(embedding.values),
            Some(_) => Err(ModelError::EmptyOutput),
            None => Err(ModelError::Malformed("missing `embedding` field".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    #[serde(default)]
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible client (OpenAI, llama.cpp server, vLLM, ...).
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
}

impl OpenAiClient {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ModelError> {
        let api_base = config.effective_api_base();
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.clone())
            .with_api_base(api_base.clone());
        debug!(api_base = %api_base, "openai client created");

        Ok(Self {
            client: Client::with_config(openai_config),
            http: http_client(config)?,
            api_base,
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    #[allow(deprecated)]
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, ModelError> {
        let message = ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
            name: None,
        });

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.chat_model.clone())
            .messages(vec![message])
            .temperature(config.temperature)
            .top_p(config.top_p)
            .max_tokens(config.max_output_tokens)
            .build()?;

        debug!(model = %self.chat_model, "openai chat completion");
        let response = self.client.chat().create(request).await?;

        let text: String = response
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .collect();
        if text.trim().is_empty() {
            return Err(ModelError::EmptyOutput);
        }
        Ok(text)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let response = self
            .http
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&OpenAiEmbeddingRequest {
                model: &self.embedding_model,
                input: text,
            })
            .send()
            .await?;
        let parsed: OpenAiEmbeddingResponse = error_for_status(response).await?.json().await?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|vector| !vector.is_empty())
            .ok_or(ModelError::EmptyOutput)
    }
}
