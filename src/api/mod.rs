//! HTTP API 모듈
//!
//! - `GET /`, `GET /health`, `GET|HEAD /api/health`
//! - `POST /api/query-stream`: SSE 스트리밍 질의응답
//! - `GET /test-embedding`, `/test-llm`, `/test-loader`: 컴포넌트 진단

mod state;

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::LegalRagError;
use crate::knowledge::{find_source_file, law_domain_of, StatuteLoader, ALL_DOMAINS};
use crate::rag::strip_think_tags;

pub use state::AppContext;

/// 진단용 임베딩 텍스트
const TEST_EMBEDDING_TEXT: &str = "법률 자문 시스템 테스트";
/// 진단용 LLM 프롬프트
const TEST_LLM_PROMPT: &str = "법률 자문 시스템에 대해 간단히 설명해주세요.";
/// 로더 진단 대상 컬렉션
const TEST_LOADER_COLLECTION: &str = "commercial_law";

// ============================================================================
// Router
// ============================================================================

/// 라우터 생성
pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = cors_layer(&ctx.settings().cors_origins);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/api/query-stream", post(query_stream))
        .route("/test-embedding", get(test_embedding))
        .route("/test-llm", get(test_llm))
        .route("/test-loader", get(test_loader))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// 서버 실행 (시작 초기화 후 바인드)
pub async fn serve(ctx: Arc<AppContext>, bind: &str) -> anyhow::Result<()> {
    ctx.initialize().await;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(ctx))
        .await
        .context("HTTP server error")
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::HEAD, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

// ============================================================================
// Errors
// ============================================================================

/// 핸들러 에러 응답 (`{"error": ..., "status": "error"}`)
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<LegalRagError> for ApiError {
    fn from(err: LegalRagError) -> Self {
        let status = match err {
            LegalRagError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LegalRagError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{:#}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.message, "status": "error" });
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn root() -> Json<Value> {
    tracing::info!("Root endpoint called");
    Json(json!({ "message": "LegalPlan RAG API 서비스에 오신 것을 환영합니다!" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default = "default_law_type")]
    law_type: String,
}

fn default_law_type() -> String {
    ALL_DOMAINS.to_string()
}

/// SSE 스트리밍 질의응답
///
/// `{"chunk", "status":"generating"}` 이벤트들 뒤에 `{"status":"complete"}`로 끝나며,
/// 실패 시 `{"error", "status":"error"}` 이벤트 하나로 끝납니다.
async fn query_stream(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    tracing::info!("Streaming query request: {}", request.query);

    let headers = [
        (header::CACHE_CONTROL, "no-cache"),
        (header::HeaderName::from_static("x-accel-buffering"), "no"),
    ];
    (headers, Sse::new(answer_events(ctx, request)))
}

fn answer_events(
    ctx: Arc<AppContext>,
    request: QueryRequest,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let pipeline = match ctx.pipeline().await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                yield Ok(error_event(&e.to_string()));
                return;
            }
        };

        let mut chunks = pipeline.answer_stream(&request.query, &request.law_type);
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(text) => yield Ok(data_event(json!({ "chunk": text, "status": "generating" }))),
                Err(e) => {
                    tracing::error!("Streaming query failed: {:#}", e);
                    yield Ok(error_event(&e.to_string()));
                    return;
                }
            }
        }

        yield Ok(data_event(json!({ "status": "complete" })));
    }
}

fn data_event(payload: Value) -> Event {
    Event::default().data(payload.to_string())
}

fn error_event(message: &str) -> Event {
    data_event(json!({ "error": message, "status": "error" }))
}

async fn test_embedding(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    let embedder = ctx.embedder().await?;
    let vector = embedder.embed_query(TEST_EMBEDDING_TEXT).await?;
    let preview: Vec<f32> = vector.iter().take(5).copied().collect();

    Ok(Json(json!({
        "text": TEST_EMBEDDING_TEXT,
        "vector_size": vector.len(),
        "vector_preview": preview,
    })))
}

async fn test_llm(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    let llm = ctx.llm().await?;
    let response = llm.generate(TEST_LLM_PROMPT).await?;

    Ok(Json(json!({
        "prompt": TEST_LLM_PROMPT,
        "response": strip_think_tags(&response).trim(),
    })))
}

/// 상법 데이터 로더 진단 (실패도 200 + `status: error`로 응답)
async fn test_loader(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let dir = ctx.settings().domain_dir(TEST_LOADER_COLLECTION);

    let report = find_source_file(&dir)
        .ok_or(LegalRagError::NotFound(dir))
        .and_then(|path| {
            StatuteLoader::new(path, law_domain_of(TEST_LOADER_COLLECTION)).load()
        });

    match report {
        Ok(report) => {
            let first = report.documents.first();
            Json(json!({
                "status": "success",
                "total_documents": report.documents.len(),
                "skipped_records": report.skipped,
                "first_document_preview": {
                    "content": first.map(|d| d.preview(200)).unwrap_or_default(),
                    "metadata": first.map(|d| json!(d.metadata)).unwrap_or_else(|| json!({})),
                },
            }))
        }
        Err(e) => {
            tracing::error!("Loader diagnostic failed: {}", e);
            Json(json!({ "status": "error", "error": e.to_string() }))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
