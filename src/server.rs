//! # HTTP surface
//!
//! | Method | Path                   | Body / reply                                   |
//! |--------|------------------------|------------------------------------------------|
//! | POST   | `/chat`                | `ChatBody` → `ChatReply`                       |
//! | GET    | `/health`              | `{status, message, timestamp, version}`        |
//! | GET    | `/knowledge`           | active knowledge, priority first               |
//! | POST   | `/embeddings/generate` | `{"action": "generate_all"}` → `{success, message}` |
//!
//! Every route is also served under `/api`. Errors are `{error, details?}`.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{any::Any, error::Error};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::knowledge::{Category, SearchResult};
use crate::pipeline::{ChatPipeline, ChatRequest};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(error) => (StatusCode::BAD_REQUEST, ErrorBody { error, details: None }),
            ApiError::Internal { message, details } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: message,
                    details,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: ChatPipeline,
    pub sources_in_response: usize,
    pub expose_error_details: bool,
}

impl AppState {
    fn internal(&self, message: &str, cause: &dyn Error) -> ApiError {
        error!(error = %cause, "{message}");
        ApiError::Internal {
            message: message.to_string(),
            details: self.expose_error_details.then(|| cause.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub message: String,
    pub session_id: Option<String>,
    pub language: Option<String>,
    pub force_language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub relevant_sources: Vec<RelevantSource>,
    pub metadata: ChatMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelevantSource {
    pub category: Category,
    pub title: String,
    pub confidence: u8,
    pub source: String,
}

impl From<&SearchResult> for RelevantSource {
    fn from(result: &SearchResult) -> Self {
        Self {
            category: result.entry.category,
            title: result.entry.title.clone(),
            confidence: result.confidence_percent(),
            source: result.source.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetadata {
    pub language: String,
    pub knowledge_items_used: usize,
    pub processing_time_ms: u64,
}

#[derive(Debug, Serialize)]
struct KnowledgeView {
    category: Category,
    title: String,
    content: String,
    keywords: Vec<String>,
    priority: i32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingAction {
    #[serde(default)]
    action: String,
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(body) = body.map_err(|e| {
        warn!(error = %e, "rejected chat body");
        ApiError::BadRequest("Message is required".to_string())
    })?;
    if body.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message is required".to_string()));
    }

    let outcome = state
        .pipeline
        .handle(&ChatRequest {
            message: body.message,
            session_id: body.session_id,
            language: body.language,
            force_language: body.force_language,
        })
        .await;

    Ok(Json(ChatReply {
        relevant_sources: outcome
            .results
            .iter()
            .take(state.sources_in_response)
            .map(RelevantSource::from)
            .collect(),
        metadata: ChatMetadata {
            language: outcome.language.to_string(),
            knowledge_items_used: outcome.results.len(),
            processing_time_ms: outcome.processing_time_ms,
        },
        response: outcome.response,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Portfolio assistant online",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn knowledge(State(state): State<AppState>) -> Result<Json<Vec<KnowledgeView>>, ApiError> {
    let entries = state
        .pipeline
        .active_knowledge()
        .await
        .map_err(|e| state.internal("Failed to fetch knowledge base", &e))?;

    Ok(Json(
        entries
            .into_iter()
            .map(|e| KnowledgeView {
                category: e.category,
                title: e.title,
                content: e.content,
                keywords: e.keywords,
                priority: e.priority,
            })
            .collect(),
    ))
}

async fn generate_embeddings(
    State(state): State<AppState>,
    body: Result<Json<EmbeddingAction>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let action = body.map(|Json(b)| b.action).unwrap_or_default();
    if action != "generate_all" {
        return Err(ApiError::BadRequest("Invalid action".to_string()));
    }

    let report = state
        .pipeline
        .backfill_all(|_, _| {})
        .await
        .map_err(|e| state.internal("Failed to generate embeddings", &e))?;

    let message = if report.failed == 0 {
        "All embeddings generated successfully".to_string()
    } else {
        format!(
            "Generated {} of {} embeddings; {} failed",
            report.stored, report.attempted, report.failed
        )
    };
    Ok(Json(json!({ "success": report.failed == 0, "message": message })))
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .route("/knowledge", get(knowledge))
        .route("/embeddings/generate", post(generate_embeddings))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()));
    error!(details = ?details, "request handler panicked");
    ApiError::Internal {
        message: "Internal server error".to_string(),
        details: None,
    }
    .into_response()
}

pub fn create_router(pipeline: ChatPipeline, sources_in_response: usize, config: &ServerConfig) -> Router {
    let state = AppState {
        pipeline,
        sources_in_response,
        expose_error_details: config.expose_error_details,
    };

    Router::new()
        .merge(routes())
        .nest("/api", routes())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}

/// Bind `config.bind_address` and serve until Ctrl-C.
pub async fn serve(
    pipeline: ChatPipeline,
    sources_in_response: usize,
    config: &ServerConfig,
) -> Result<(), Box<dyn Error>> {
    let router = create_router(pipeline, sources_in_response, config);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortfolioConfig;
    use crate::test_support::{
        CountingEmbedder, FailingStore, InMemoryStore, ScriptedModel, collaborators, entry,
    };
    use crate::pipeline::Collaborators;
    use crate::store::KnowledgeStore;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(store: Arc<InMemoryStore>, model: ScriptedModel) -> Router {
        let config = PortfolioConfig::default();
        let pipeline = ChatPipeline::new(
            collaborators(store, Arc::new(model), Arc::new(CountingEmbedder::failing())),
            &config,
        );
        create_router(pipeline, 3, &config.server)
    }

    fn seeded() -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::with_entries(vec![
            entry(1, Category::Education, "Master's degree", "EIT Digital Master School", 5),
            entry(2, Category::Education, "Bachelor", "Zhejiang University", 4),
            entry(3, Category::Education, "Exchange", "KTH", 3),
            entry(4, Category::Education, "High school", "Hangzhou", 2),
        ]))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn chat_returns_answer_sources_and_metadata() {
        let app = app(seeded(), ScriptedModel::replying(["Yiming studied at EIT Digital."]));
        let response = app
            .oneshot(post_json(
                "/chat",
                json!({ "message": "What university did Yiming study at?", "sessionId": "s1" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["response"], "Yiming studied at EIT Digital.");
        let sources = body["relevantSources"].as_array().unwrap();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0]["category"], "education");
        assert_eq!(sources[0]["title"], "Master's degree");
        assert_eq!(sources[0]["confidence"], 68);
        assert_eq!(sources[0]["source"], "category_match");
        assert_eq!(body["metadata"]["language"], "en");
        assert_eq!(body["metadata"]["knowledgeItemsUsed"], 4);
        assert!(body["metadata"]["processingTimeMs"].is_u64());
    }

    #[tokio::test]
    async fn blank_or_missing_message_is_rejected() {
        for payload in [json!({ "message": "   " }), json!({ "sessionId": "s1" })] {
            let response = app(seeded(), ScriptedModel::failing())
                .oneshot(post_json("/api/chat", payload))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert_eq!(body["error"], "Message is required");
            assert!(body.get("details").is_none());
        }
    }

    #[tokio::test]
    async fn health_reports_ok_on_both_prefixes() {
        for uri in ["/health", "/api/health"] {
            let response = app(seeded(), ScriptedModel::failing())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["status"], "ok");
            assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        }
    }

    #[tokio::test]
    async fn knowledge_lists_active_entries_by_priority() {
        let response = app(seeded(), ScriptedModel::failing())
            .oneshot(Request::builder().uri("/knowledge").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        let titles: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Master's degree", "Bachelor", "Exchange", "High school"]);
    }

    #[tokio::test]
    async fn knowledge_failure_is_a_structured_500() {
        let config = PortfolioConfig::default();
        let pipeline = ChatPipeline::new(
            Collaborators {
                knowledge: Arc::new(FailingStore),
                cache: Arc::new(FailingStore),
                conversations: Arc::new(FailingStore),
                model: Arc::new(ScriptedModel::failing()),
                embedder: Arc::new(CountingEmbedder::failing()),
            },
            &config,
        );
        let app = create_router(pipeline, 3, &config.server);
        let response = app
            .oneshot(Request::builder().uri("/knowledge").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Failed to fetch knowledge base");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn embeddings_generate_requires_generate_all() {
        let response = app(seeded(), ScriptedModel::failing())
            .oneshot(post_json("/embeddings/generate", json!({ "action": "nope" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid action");
    }

    #[tokio::test]
    async fn embeddings_generate_backfills_everything() {
        let store = seeded();
        let config = PortfolioConfig::default();
        let pipeline = ChatPipeline::new(
            collaborators(
                store.clone(),
                Arc::new(ScriptedModel::failing()),
                Arc::new(CountingEmbedder::constant(vec![0.5, 0.5])),
            ),
            &config,
        );
        let response = create_router(pipeline, 3, &config.server)
            .oneshot(post_json("/api/embeddings/generate", json!({ "action": "generate_all" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "All embeddings generated successfully");
        assert!(store.entries_missing_embedding(None).await.unwrap().is_empty());
    }
}
