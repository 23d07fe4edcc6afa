//! Translate Converse-style provider responses into external chat-completion
//! responses.

use std::time::{SystemTime, UNIX_EPOCH};

use super::converse_types::{ConverseBlock, ConverseResponse, ConverseUsage};
use super::openai_types::{
    ChatCompletionResponse, ChatUsage, Choice, ChoiceMessage,
};

/// Translate a provider response.
///
/// `external_model` is the model name the caller originally requested; it is
/// echoed back verbatim so callers that branch on model name keep working.
/// The response id and `created` timestamp are generated here, never
/// inherited from the provider.
pub fn converse_to_openai(
    resp: &ConverseResponse,
    external_model: &str,
) -> ChatCompletionResponse {
    let text_parts: Vec<&str> = resp
        .output
        .message
        .content
        .iter()
        .filter_map(|block| match block {
            ConverseBlock::Text(t) => Some(t.as_str()),
            ConverseBlock::Image(_) | ConverseBlock::Other(_) => None,
        })
        .collect();

    let content = if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.join("\n"))
    };

    ChatCompletionResponse {
        id: new_response_id(),
        object: "chat.completion".to_string(),
        created: unix_now(),
        model: external_model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason: Some(map_stop_reason(&resp.stop_reason).to_string()),
        }],
        usage: map_usage(&resp.usage),
    }
}

/// Map a provider stop reason to an external finish reason.
///
/// An unrecognized value never fails translation; it is logged and defaults
/// to `stop`.
pub fn map_stop_reason(stop_reason: &str) -> &'static str {
    match stop_reason {
        "end_turn" | "stop_sequence" => "stop",
        "max_tokens" => "length",
        "content_filtered" => "content_filter",
        "tool_use" => "tool_calls",
        other => {
            tracing::warn!(stop_reason = other, "Unrecognized provider stop reason");
            "stop"
        }
    }
}

pub fn map_usage(usage: &ConverseUsage) -> ChatUsage {
    ChatUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
    }
}

pub fn new_response_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
