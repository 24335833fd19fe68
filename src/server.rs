use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::indexing::PassageIndexer;
use crate::model::{AskResponse, PassageRecord};
use crate::rag::AskPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AskPipeline>,
    pub indexer: Arc<PassageIndexer>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/ask", get(ask))
        .route("/api/upload", post(upload))
        .route("/api/clear", post(clear))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(state: AppState, bind: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(address = %bind, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[derive(Debug, Deserialize)]
struct AskParams {
    #[serde(default)]
    query: String,
}

#[derive(Debug, Serialize)]
struct UploadReply {
    response: String,
    uploaded: usize,
}

async fn ask(
    State(state): State<AppState>,
    Query(params): Query<AskParams>,
) -> Result<Json<AskResponse>, ApiError> {
    if params.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let outcome = state.pipeline.ask(&params.query).await?;
    Ok(Json(AskResponse {
        answer: outcome.answer,
    }))
}

async fn upload(
    State(state): State<AppState>,
    Json(records): Json<Vec<PassageRecord>>,
) -> Result<Json<UploadReply>, ApiError> {
    let summary = state.indexer.upload(records).await?;
    Ok(Json(UploadReply {
        response: format!("Uploaded {} passages", summary.uploaded),
        uploaded: summary.uploaded,
    }))
}

async fn clear(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.indexer.clear().await?;
    Ok(Json(json!({ "response": "Index cleared" })))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Pipeline(PipelineError),
    Internal(anyhow::Error),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Pipeline(err) => {
                let status = if err.is_timeout() {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                error!(error = %err, "ask request failed");
                (status, err.to_string())
            }
            Self::Internal(err) => {
                error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{AppConfig, RetrievalFailurePolicy};
    use crate::providers::{ChatModel, LocalHashEmbedder, SqliteIndex};
    use crate::rag::testing::{ScriptedChat, StaticRetriever};
    use crate::rag::{FusionParams, PipelineSettings};

    fn state(chat: Arc<dyn ChatModel>, dir: &tempfile::TempDir) -> AppState {
        let retriever = StaticRetriever::new().with_list("pergunta", &["doc1"]);
        let settings = PipelineSettings {
            expansion_count: 1,
            search_k: 5,
            fusion: FusionParams::default(),
            failure_policy: RetrievalFailurePolicy::Abort,
            expansion_timeout: Duration::from_secs(1),
            retrieval_timeout: Duration::from_secs(1),
            synthesis_timeout: Duration::from_secs(1),
        };
        let pipeline =
            AskPipeline::with_settings(chat, Arc::new(retriever), &AppConfig::default(), settings);
        let index = SqliteIndex::new("api-test", dir.path().join("index.sqlite"), "local-hash-v1");
        let indexer = PassageIndexer::new(Arc::new(LocalHashEmbedder::new(32)), Arc::new(index), 16);

        AppState {
            pipeline: Arc::new(pipeline),
            indexer: Arc::new(indexer),
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn ask_returns_answer_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chat = ScriptedChat::replying(&["pergunta", "Resposta."]);
        let app = router(state(chat, &dir));

        let (status, body) = send(app, get_request("/api/ask?query=Quando%20abre%3F")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "answer": "Resposta." }));
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chat = ScriptedChat::replying(&[]);
        let app = router(state(chat.clone(), &dir));

        let (status, body) = send(app, get_request("/api/ask?query=%20")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some());
        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn pipeline_failure_maps_to_server_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(state(ScriptedChat::failing("upstream down"), &dir));

        let (status, body) = send(app, get_request("/api/ask?query=oi")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "query expansion failed");
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_timeout_maps_to_gateway_timeout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chat = ScriptedChat::slow(Duration::from_secs(10), &["late"]);
        let app = router(state(chat, &dir));

        let (status, _) = send(app, get_request("/api/ask?query=oi")).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn upload_then_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(ScriptedChat::replying(&[]), &dir);

        let (status, body) = send(
            router(state.clone()),
            post_json(
                "/api/upload",
                r#"[{"content": "Biblioteca abre às 8h."}, {"id": "b2", "content": "Fecha às 22h.", "metadata": {"source": "guia"}}]"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["uploaded"], 2);
        assert_eq!(state.indexer.stats().await.expect("stats").vector_count, 2);

        let (status, body) = send(router(state.clone()), post_json("/api/clear", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Index cleared");
        assert_eq!(state.indexer.stats().await.expect("stats").vector_count, 0);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(state(ScriptedChat::replying(&[]), &dir));

        let (status, body) = send(app, get_request("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
