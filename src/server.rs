use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::logging::SharedLogger;
use crate::proxy::{self, StreamFrame};
use crate::registry::ModelRegistry;
use crate::translate::error as error_translate;
use crate::translate::openai_types::{ChatCompletionRequest, ErrorResponse};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub registry: ModelRegistry,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/models", get(handle_models))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state
                .logger
                .error("server", format!("Failed to parse request: {}", e));
            let err = ErrorResponse::new(
                error_translate::INVALID_REQUEST_ERROR,
                format!("Invalid request body: {}", e),
            );
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    let is_streaming = req.stream.unwrap_or(false);

    state.logger.info(
        "server",
        format!(
            "Request: model={} streaming={} messages={}",
            req.model,
            is_streaming,
            req.messages.len()
        ),
    );

    if is_streaming {
        handle_streaming(state, &req).await
    } else {
        handle_non_streaming(state, &req).await
    }
}

async fn handle_non_streaming(state: Arc<AppState>, req: &ChatCompletionRequest) -> Response {
    match proxy::proxy_chat(req, &state.config, &state.registry, &state.client, &state.logger).await
    {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => {
            state
                .logger
                .error("server", format!("Request failed: {}", e.kind_name()));
            error_response(&e)
        }
    }
}

async fn handle_streaming(state: Arc<AppState>, req: &ChatCompletionRequest) -> Response {
    let frames = match proxy::proxy_chat_stream(
        req,
        &state.config,
        &state.registry,
        &state.client,
        &state.logger,
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            // Setup failures (bad parameters, unknown model) predate the
            // first byte of the response, so a plain HTTP error applies.
            state
                .logger
                .error("server", format!("Streaming setup failed: {}", e.kind_name()));
            return error_response(&e);
        }
    };

    let event_stream = frames.map(|frame| -> std::result::Result<Event, Infallible> {
        match frame {
            StreamFrame::Chunk(chunk) => match serde_json::to_string(&chunk) {
                Ok(json) => Ok(Event::default().data(json)),
                Err(_) => Ok(Event::default().data("{}")),
            },
            StreamFrame::Error(body) => match serde_json::to_string(&body) {
                Ok(json) => Ok(Event::default().data(json)),
                Err(_) => Ok(Event::default().data("{}")),
            },
            StreamFrame::Done => Ok(Event::default().data("[DONE]")),
        }
    });

    Sse::new(event_stream)
        .keep_alive(axum::response::sse::KeepAlive::default())
        .into_response()
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let models: Vec<serde_json::Value> = state
        .registry
        .list()
        .into_iter()
        .map(|entry| {
            let mut model = serde_json::json!({
                "id": entry.id,
                "object": "model",
                "owned_by": entry.owned_by,
            });
            if let Some(ctx) = entry.context_length {
                model["context_length"] = serde_json::json!(ctx);
            }
            if entry.vision {
                model["vision"] = serde_json::json!(true);
            }
            model
        })
        .collect();

    Json(serde_json::json!({ "object": "list", "data": models }))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    let mut failing: Vec<&str> = Vec::new();

    if state.config.resolve_api_key().is_err() {
        failing.push("credentials");
    }

    // Any HTTP response counts as reachable; only connect-level failures
    // (refused, unresolved, timed out) mark the provider down.
    let reachability = state
        .client
        .get(state.config.base_url())
        .timeout(std::time::Duration::from_secs(2))
        .send()
        .await;
    if reachability.is_err() {
        failing.push("provider");
    }

    if failing.is_empty() {
        Json(serde_json::json!({
            "status": "ok",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "service": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "failing": failing,
            })),
        )
            .into_response()
    }
}

fn error_response(err: &ProxyError) -> Response {
    let (body, status) = error_translate::translate(err);
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}
