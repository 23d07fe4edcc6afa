//! Request orchestration: resolve, translate, invoke the backing provider,
//! convert the result. Every failure funnels into [`ProxyError`] so the
//! server layer has one translation point.

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogLevel, SharedLogger};
use crate::registry::ModelRegistry;
use crate::translate::converse_types::{
    ConverseErrorBody, ConverseRequest, ConverseResponse, ConverseStreamEvent,
};
use crate::translate::error as error_translate;
use crate::translate::openai_types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChunkChoice, ChunkDelta,
    ErrorResponse,
};
use crate::translate::request::openai_to_converse;
use crate::translate::response::converse_to_openai;
use crate::translate::streaming::StreamTranslator;

use eventsource_stream::Eventsource;
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use std::time::Instant;

/// One frame of the external streaming response. `Done` maps to the literal
/// `data: [DONE]` line; the sequence always ends with exactly one of them.
#[derive(Debug, Clone)]
pub enum StreamFrame {
    Chunk(ChatCompletionChunk),
    Error(ErrorResponse),
    Done,
}

pub type FrameStream = Pin<Box<dyn Stream<Item = StreamFrame> + Send>>;

/// Handle a non-streaming chat completion end to end.
pub async fn proxy_chat(
    req: &ChatCompletionRequest,
    config: &ProxyConfig,
    registry: &ModelRegistry,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<ChatCompletionResponse> {
    let started = Instant::now();

    let converse_req = openai_to_converse(req, registry, config.limits.max_image_bytes)?;
    let model_id = converse_req.model_id.clone();

    let provider_resp = send_converse(&converse_req, config, client, logger).await?;
    let response = converse_to_openai(&provider_resp, &req.model);

    logger.log_with_context(
        LogLevel::Info,
        "proxy",
        "Chat completion finished",
        serde_json::json!({
            "model_id": model_id,
            "elapsed_ms": started.elapsed().as_millis() as u64,
            "prompt_tokens": response.usage.prompt_tokens,
            "completion_tokens": response.usage.completion_tokens,
        }),
    );

    Ok(response)
}

/// Handle a streaming chat completion.
///
/// Request translation and validation happen before the first frame, so
/// parameter problems still surface as a plain HTTP error. Once the returned
/// stream is live it owns the provider connection; dropping it (caller
/// disconnect, deadline) drops the in-flight provider stream with it.
pub async fn proxy_chat_stream(
    req: &ChatCompletionRequest,
    config: &ProxyConfig,
    registry: &ModelRegistry,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<FrameStream> {
    let converse_req = openai_to_converse(req, registry, config.limits.max_image_bytes)?;

    let external_model = req.model.clone();
    let config = config.clone();
    let client = client.clone();
    let logger = logger.clone();

    let frames = async_stream::stream! {
        let started = Instant::now();
        let mut translator = StreamTranslator::new(&external_model);

        let response = match open_converse_stream(&converse_req, &config, &client, &logger).await {
            Ok(r) => r,
            Err(err) => {
                // Nothing has been sent downstream yet; the single
                // non-streaming retry applies.
                for frame in fallback(&converse_req, &external_model, &config, &client, &logger, &err).await {
                    yield frame;
                }
                return;
            }
        };

        let mut events = response.bytes_stream().eventsource();
        let mut stream_error: Option<ProxyError> = None;

        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    let provider_event: ConverseStreamEvent =
                        match serde_json::from_str(&event.data) {
                            Ok(e) => e,
                            Err(e) => {
                                logger.debug(
                                    "stream",
                                    format!("Skipping unparseable provider frame: {e}"),
                                );
                                continue;
                            }
                        };

                    for chunk in translator.process_event(&provider_event) {
                        yield StreamFrame::Chunk(chunk);
                    }
                }
                Err(e) => {
                    stream_error = Some(ProxyError::provider(format!(
                        "provider stream failed: {e}"
                    )));
                    break;
                }
            }
        }

        match stream_error {
            Some(err) if !translator.deltas_emitted() => {
                for frame in fallback(&converse_req, &external_model, &config, &client, &logger, &err).await {
                    yield frame;
                }
            }
            Some(err) => {
                // Partial content has reached the caller; a retry would
                // duplicate it. Emit a terminal error frame instead.
                logger.log_with_context(
                    LogLevel::Error,
                    "stream",
                    "Provider stream failed mid-response",
                    serde_json::json!({
                        "model_id": converse_req.model_id,
                        "error_kind": err.kind_name(),
                        "elapsed_ms": started.elapsed().as_millis() as u64,
                    }),
                );
                let (body, _) = error_translate::translate(&err);
                yield StreamFrame::Error(body);
                yield StreamFrame::Done;
            }
            None => {
                for chunk in translator.finish() {
                    yield StreamFrame::Chunk(chunk);
                }
                logger.log_with_context(
                    LogLevel::Info,
                    "stream",
                    "Stream completed",
                    serde_json::json!({
                        "model_id": converse_req.model_id,
                        "elapsed_ms": started.elapsed().as_millis() as u64,
                    }),
                );
                yield StreamFrame::Done;
            }
        }
    };

    Ok(Box::pin(frames))
}

/// One non-streaming retry, allowed only while no delta has been emitted.
/// Returns the frames to send downstream either way.
async fn fallback(
    converse_req: &ConverseRequest,
    external_model: &str,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
    cause: &ProxyError,
) -> Vec<StreamFrame> {
    logger.log_with_context(
        LogLevel::Warn,
        "stream",
        "Provider stream failed before first delta, retrying non-streaming",
        serde_json::json!({
            "model_id": converse_req.model_id,
            "error_kind": cause.kind_name(),
        }),
    );

    match send_converse(converse_req, config, client, logger).await {
        Ok(provider_resp) => {
            let response = converse_to_openai(&provider_resp, external_model);
            let mut frames: Vec<StreamFrame> = response_as_chunks(&response)
                .into_iter()
                .map(StreamFrame::Chunk)
                .collect();
            frames.push(StreamFrame::Done);
            frames
        }
        Err(err) => {
            logger.error(
                "stream",
                format!("Non-streaming fallback failed: {}", err.kind_name()),
            );
            let (body, _) = error_translate::translate(&err);
            vec![StreamFrame::Error(body), StreamFrame::Done]
        }
    }
}

/// Re-frame a complete response as a minimal chunk sequence: role, one
/// content delta, finish, usage.
fn response_as_chunks(response: &ChatCompletionResponse) -> Vec<ChatCompletionChunk> {
    let base = |choices: Vec<ChunkChoice>| ChatCompletionChunk {
        id: response.id.clone(),
        object: "chat.completion.chunk".to_string(),
        created: response.created,
        model: response.model.clone(),
        choices,
        usage: None,
    };

    let choice = response.choices.first();

    let mut chunks = vec![base(vec![ChunkChoice {
        index: 0,
        delta: ChunkDelta {
            role: Some("assistant".to_string()),
            content: None,
        },
        finish_reason: None,
    }])];

    if let Some(content) = choice.and_then(|c| c.message.content.clone()) {
        chunks.push(base(vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: None,
                content: Some(content),
            },
            finish_reason: None,
        }]));
    }

    chunks.push(base(vec![ChunkChoice {
        index: 0,
        delta: ChunkDelta::default(),
        finish_reason: choice
            .and_then(|c| c.finish_reason.clone())
            .or_else(|| Some("stop".to_string())),
    }]));

    let mut usage_chunk = base(Vec::new());
    usage_chunk.usage = Some(response.usage.clone());
    chunks.push(usage_chunk);

    chunks
}

/// Call the provider's non-streaming converse endpoint.
async fn send_converse(
    request: &ConverseRequest,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<ConverseResponse> {
    let api_key = config.resolve_api_key()?;
    let url = format!(
        "{}/model/{}/converse",
        config.base_url(),
        request.model_id
    );

    logger.info("proxy", format!("POST {url}"));

    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .json(request)
        .send()
        .await
        .map_err(|e| ProxyError::provider(format!("request failed: {e}")))?;

    let status = response.status().as_u16();
    if status >= 400 {
        return Err(provider_error_from_response(response, logger).await);
    }

    let body = response
        .text()
        .await
        .map_err(|e| ProxyError::provider(format!("failed to read response body: {e}")))?;

    serde_json::from_str(&body).map_err(|e| {
        ProxyError::provider(format!(
            "failed to parse provider response: {e}. Body: {}",
            truncate(&body, 300)
        ))
    })
}

/// Open the provider's streaming converse endpoint. The returned response's
/// byte stream carries `data: {json}` SSE frames.
async fn open_converse_stream(
    request: &ConverseRequest,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<reqwest::Response> {
    let api_key = config.resolve_api_key()?;
    let url = format!(
        "{}/model/{}/converse-stream",
        config.base_url(),
        request.model_id
    );

    logger.info("proxy", format!("POST {url} (streaming)"));

    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .header("Accept", "text/event-stream")
        .json(request)
        .send()
        .await
        .map_err(|e| ProxyError::provider(format!("streaming request failed: {e}")))?;

    let status = response.status().as_u16();
    if status >= 400 {
        return Err(provider_error_from_response(response, logger).await);
    }

    Ok(response)
}

/// Read and classify a non-2xx provider response. The raw body is logged
/// truncated; only the classification survives toward the caller.
async fn provider_error_from_response(
    response: reqwest::Response,
    logger: &SharedLogger,
) -> ProxyError {
    let status = response.status().as_u16();

    let header_type = response
        .headers()
        .get("x-amzn-errortype")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response.text().await.unwrap_or_default();
    let body_type = serde_json::from_str::<ConverseErrorBody>(&body)
        .ok()
        .and_then(|b| b.error_type);

    let error_type = header_type.or(body_type);

    logger.log_with_context(
        LogLevel::Warn,
        "proxy",
        "Provider error response",
        serde_json::json!({
            "status": status,
            "error_type": error_type,
            "body": truncate(&body, 300),
        }),
    );

    error_translate::classify_provider_error(status, error_type.as_deref())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::openai_types::{ChatUsage, Choice, ChoiceMessage};

    #[test]
    fn test_response_as_chunks_framing() {
        let response = ChatCompletionResponse {
            id: "chatcmpl-test".to_string(),
            object: "chat.completion".to_string(),
            created: 123,
            model: "alias-a".to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role: "assistant".to_string(),
                    content: Some("Hello".to_string()),
                },
                finish_reason: Some("length".to_string()),
            }],
            usage: ChatUsage {
                prompt_tokens: 1,
                completion_tokens: 2,
                total_tokens: 3,
            },
        };

        let chunks = response_as_chunks(&response);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("Hello"));
        assert_eq!(chunks[2].choices[0].finish_reason.as_deref(), Some("length"));
        assert_eq!(chunks[3].usage.as_ref().unwrap().total_tokens, 3);
        assert!(chunks.iter().all(|c| c.id == "chatcmpl-test"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 2), "he");
        // Multi-byte safety
        assert_eq!(truncate("héllo", 2), "hé");
    }
}
