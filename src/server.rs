use crate::config::RelayConfig;
use crate::emit::{event_stream_response, json_response};
use crate::error::RelayError;
use crate::logging::RequestLog;
use crate::models::list_models;
use crate::proxy;
use crate::translate::client_types::{ChatCompletionRequest, ErrorResponse};
use crate::upstream::UpstreamClient;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const SERVICE_NAME: &str = "chat-relay";

/// Process-wide state, read-only once the server starts.
pub struct AppState {
    pub config: RelayConfig,
    pub upstream: UpstreamClient,
    pub log: RequestLog,
    pub started_at: i64,
}

impl AppState {
    pub fn new(config: RelayConfig, upstream: UpstreamClient, log: RequestLog) -> Self {
        Self {
            config,
            upstream,
            log,
            started_at: chrono::Utc::now().timestamp(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/v1/chat/completions",
            post(handle_chat_completions).fallback(handle_not_found),
        )
        .route("/v1/models", get(handle_models).fallback(handle_not_found))
        .route("/health", get(handle_health).fallback(handle_not_found))
        .fallback(handle_not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let log = state.log.for_request(&request_id);

    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let err = RelayError::invalid_request(format!("Invalid request body: {e}"));
            log.warn("server", err.to_string());
            return err.into_response();
        }
    };

    log.info(
        "server",
        format!(
            "Request: model={} streaming={} messages={}",
            req.model,
            req.is_streaming(),
            req.messages.len()
        ),
    );

    if req.is_streaming() {
        match proxy::proxy_streaming(&req, &state.config, &state.upstream, &log).await {
            Ok(items) => event_stream_response(items),
            Err(e) => {
                log.error("server", format!("Streaming setup error: {e}"));
                e.into_response()
            }
        }
    } else {
        match proxy::proxy_non_streaming(&req, &state.config, &state.upstream, &log).await {
            Ok(resp) => json_response(resp),
            Err(e) => {
                log.error("server", format!("Proxy error: {e}"));
                e.into_response()
            }
        }
    }
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Response {
    json_response(list_models(&state.config.models, SERVICE_NAME, state.started_at))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "reasoning_display": state.config.reasoning.display,
        "thinking_mode": state.config.reasoning.thinking_mode,
    }))
}

async fn handle_not_found(uri: Uri) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::not_found(uri.path()))).into_response()
}
