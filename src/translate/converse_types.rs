//! Type definitions for the Converse-style backing inference protocol.
//!
//! Field names follow the provider's camelCase wire convention. Image bytes
//! travel base64-encoded inside the JSON body.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request types (what we send TO the provider)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
    pub model_id: String,
    pub messages: Vec<ConverseMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<SystemBlock>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_config: Option<InferenceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverseMessage {
    pub role: String, // "user" or "assistant"
    pub content: Vec<ConverseBlock>,
}

/// Provider content blocks are single-key objects: `{"text": ...}` or
/// `{"image": ...}`. Block kinds this proxy does not handle (such as
/// `toolUse`) deserialize into the catch-all variant instead of failing
/// the whole response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConverseBlock {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "image")]
    Image(ImageBlock),
    #[serde(untagged)]
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageBlock {
    pub format: String, // "jpeg", "png", "webp", "gif"
    pub source: ImageSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSource {
    /// Base64-encoded image payload.
    pub bytes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemBlock {
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl InferenceConfig {
    pub fn is_empty(&self) -> bool {
        self.max_tokens.is_none()
            && self.temperature.is_none()
            && self.top_p.is_none()
            && self.stop_sequences.is_none()
    }
}

// ---------------------------------------------------------------------------
// Response types (what the provider sends BACK)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseResponse {
    pub output: ConverseOutput,
    pub stop_reason: String,
    #[serde(default)]
    pub usage: ConverseUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverseOutput {
    pub message: ConverseMessage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Error payload the provider returns on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverseErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "__type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Streaming event types
// ---------------------------------------------------------------------------

/// One frame of the provider's streaming response. Each frame carries exactly
/// one of these fields; unrecognized frames deserialize to all-`None` and are
/// skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseStreamEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_start: Option<MessageStart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_block_delta: Option<ContentBlockDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_block_stop: Option<ContentBlockStop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_stop: Option<MessageStop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StreamMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStart {
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockDelta {
    pub delta: BlockDelta,
    #[serde(default)]
    pub content_block_index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockStop {
    #[serde(default)]
    pub content_block_index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStop {
    pub stop_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default)]
    pub usage: ConverseUsage,
}
