//! Translate external chat-completion requests into Converse-style provider
//! requests.
//!
//! System-role messages are extracted into the provider's top-level `system`
//! field; the Converse protocol separates system prompts from the turn list,
//! so none remain inline. Unknown external parameters are ignored rather than
//! rejected.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{ProxyError, Result};
use crate::registry::ModelRegistry;

use super::content::{self, ContentPart};
use super::converse_types::{
    ConverseBlock, ConverseMessage, ConverseRequest, ImageBlock, ImageSource, InferenceConfig,
    SystemBlock,
};
use super::openai_types::{ChatCompletionRequest, ChatContent, Role, StopSpec};

/// Translate a validated external request into a provider request.
///
/// Pure except for alias resolution through the registry. Fails fast with
/// `InvalidRequest` on parameter or content problems so no provider round
/// trip is wasted.
pub fn openai_to_converse(
    req: &ChatCompletionRequest,
    registry: &ModelRegistry,
    max_image_bytes: usize,
) -> Result<ConverseRequest> {
    let model_id = registry.resolve(&req.model)?.to_string();

    if req.messages.is_empty() {
        return Err(ProxyError::invalid_request("'messages' must not be empty"));
    }

    if let Some(max_tokens) = req.max_tokens {
        if max_tokens <= 0 {
            return Err(ProxyError::invalid_request(format!(
                "'max_tokens' must be a positive integer, got {max_tokens}"
            )));
        }
    }

    let mut system: Vec<SystemBlock> = Vec::new();
    let mut messages: Vec<ConverseMessage> = Vec::new();

    for msg in &req.messages {
        match msg.role {
            Role::System => {
                system.push(SystemBlock {
                    text: system_text(&msg.content)?,
                });
            }
            Role::User | Role::Assistant => {
                let parts = content::normalize(&msg.content, max_image_bytes)?;
                messages.push(ConverseMessage {
                    role: msg.role.as_str().to_string(),
                    content: parts.into_iter().map(to_converse_block).collect(),
                });
            }
        }
    }

    if messages.is_empty() {
        return Err(ProxyError::invalid_request(
            "'messages' must contain at least one user or assistant message",
        ));
    }

    let inference_config = InferenceConfig {
        max_tokens: req.max_tokens.map(|v| v as u64),
        temperature: req.temperature,
        top_p: req.top_p,
        stop_sequences: req.stop.clone().map(StopSpec::into_sequences),
    };

    Ok(ConverseRequest {
        model_id,
        messages,
        system: if system.is_empty() { None } else { Some(system) },
        inference_config: if inference_config.is_empty() {
            None
        } else {
            Some(inference_config)
        },
    })
}

fn to_converse_block(part: ContentPart) -> ConverseBlock {
    match part {
        ContentPart::Text(text) => ConverseBlock::Text(text),
        ContentPart::Image { format, data } => ConverseBlock::Image(ImageBlock {
            format: format.as_str().to_string(),
            source: ImageSource {
                bytes: BASE64.encode(data),
            },
        }),
    }
}

/// System prompts are text-only on the provider side; an image block in a
/// system message fails the request rather than being dropped.
fn system_text(content: &ChatContent) -> Result<String> {
    match content {
        ChatContent::Text(t) => Ok(t.clone()),
        ChatContent::Parts(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .map(|p| match p {
                    super::openai_types::ContentPart::Text { text } => Ok(text.as_str()),
                    super::openai_types::ContentPart::ImageUrl { .. } => Err(
                        ProxyError::invalid_request("System messages cannot contain images"),
                    ),
                })
                .collect::<Result<_>>()?;
            Ok(texts.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelAlias;
    use crate::translate::openai_types::{ChatMessage, StopSpec};
    use std::collections::HashMap;

    const LIMIT: usize = 1024 * 1024;

    fn registry() -> ModelRegistry {
        let mut aliases = HashMap::new();
        aliases.insert(
            "alias-a".to_string(),
            ModelAlias::new("amazon.nova-lite-v1:0"),
        );
        ModelRegistry::new(aliases, "nova")
    }

    fn user(text: &str) -> ChatMessage {
        ChatMessage {
            role: Role::User,
            content: ChatContent::Text(text.to_string()),
        }
    }

    fn base_request(model: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![user("Hello")],
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: None,
            stream: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_alias_and_max_tokens_scenario() {
        let mut req = base_request("alias-a");
        req.max_tokens = Some(5);

        let out = openai_to_converse(&req, &registry(), LIMIT).unwrap();

        assert_eq!(out.model_id, "amazon.nova-lite-v1:0");
        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.messages[0].role, "user");
        assert_eq!(out.inference_config.unwrap().max_tokens, Some(5));
        assert!(out.system.is_none());
    }

    #[test]
    fn test_system_extracted_to_top_level() {
        let mut req = base_request("alias-a");
        req.messages = vec![
            ChatMessage {
                role: Role::System,
                content: ChatContent::Text("You are terse.".to_string()),
            },
            user("Hi"),
        ];

        let out = openai_to_converse(&req, &registry(), LIMIT).unwrap();

        let system = out.system.unwrap();
        assert_eq!(system.len(), 1);
        assert_eq!(system[0].text, "You are terse.");
        // Never left inline in the turn list
        assert_eq!(out.messages.len(), 1);
        assert!(out.messages.iter().all(|m| m.role != "system"));
    }

    #[test]
    fn test_no_system_field_without_system_messages() {
        let out = openai_to_converse(&base_request("alias-a"), &registry(), LIMIT).unwrap();
        assert!(out.system.is_none());

        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_message_order_and_roles_preserved() {
        let mut req = base_request("alias-a");
        req.messages = vec![
            user("one"),
            ChatMessage {
                role: Role::Assistant,
                content: ChatContent::Text("two".to_string()),
            },
            user("three"),
        ];

        let out = openai_to_converse(&req, &registry(), LIMIT).unwrap();
        let roles: Vec<&str> = out.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
        assert!(matches!(out.messages[2].content[0], ConverseBlock::Text(ref t) if t == "three"));
    }

    #[test]
    fn test_stop_string_coerced_to_sequence() {
        let mut req = base_request("alias-a");
        req.stop = Some(StopSpec::One("END".to_string()));

        let out = openai_to_converse(&req, &registry(), LIMIT).unwrap();
        assert_eq!(
            out.inference_config.unwrap().stop_sequences,
            Some(vec!["END".to_string()])
        );
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let mut req = base_request("alias-a");
        req.max_tokens = Some(0);
        assert!(matches!(
            openai_to_converse(&req, &registry(), LIMIT),
            Err(ProxyError::InvalidRequest { .. })
        ));

        req.max_tokens = Some(-3);
        assert!(openai_to_converse(&req, &registry(), LIMIT).is_err());
    }

    #[test]
    fn test_unknown_model_rejected() {
        let req = base_request("not-a-model");
        assert!(matches!(
            openai_to_converse(&req, &registry(), LIMIT),
            Err(ProxyError::ModelNotFound { .. })
        ));
    }

    #[test]
    fn test_unknown_params_ignored() {
        let mut req = base_request("alias-a");
        req.extra
            .insert("frequency_penalty".to_string(), serde_json::json!(0.5));

        let out = openai_to_converse(&req, &registry(), LIMIT).unwrap();
        // Unknown knobs never reach the provider body
        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("frequency_penalty").is_none());
    }

    #[test]
    fn test_image_block_becomes_provider_image() {
        use crate::translate::openai_types::{ContentPart as WirePart, ImageUrlDetail};

        let payload = BASE64.encode(b"fakejpegdata");
        let mut req = base_request("alias-a");
        req.messages = vec![ChatMessage {
            role: Role::User,
            content: ChatContent::Parts(vec![
                WirePart::Text {
                    text: "what is this?".to_string(),
                },
                WirePart::ImageUrl {
                    image_url: ImageUrlDetail {
                        url: format!("data:image/jpeg;base64,{payload}"),
                        detail: None,
                    },
                },
            ]),
        }];

        let out = openai_to_converse(&req, &registry(), LIMIT).unwrap();
        assert_eq!(out.messages[0].content.len(), 2);
        match &out.messages[0].content[1] {
            ConverseBlock::Image(img) => {
                assert_eq!(img.format, "jpeg");
                assert_eq!(img.source.bytes, payload);
            }
            other => panic!("expected image block, got {other:?}"),
        }
    }

    #[test]
    fn test_no_inference_config_when_no_params() {
        let out = openai_to_converse(&base_request("alias-a"), &registry(), LIMIT).unwrap();
        assert!(out.inference_config.is_none());
    }

    #[test]
    fn test_image_in_system_message_rejected() {
        use crate::translate::openai_types::{ContentPart as WirePart, ImageUrlDetail};

        let mut req = base_request("alias-a");
        req.messages = vec![
            ChatMessage {
                role: Role::System,
                content: ChatContent::Parts(vec![WirePart::ImageUrl {
                    image_url: ImageUrlDetail {
                        url: "data:image/png;base64,AAAA".to_string(),
                        detail: None,
                    },
                }]),
            },
            user("Hi"),
        ];

        assert!(matches!(
            openai_to_converse(&req, &registry(), LIMIT),
            Err(ProxyError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_empty_messages_rejected() {
        let mut req = base_request("alias-a");
        req.messages.clear();
        assert!(openai_to_converse(&req, &registry(), LIMIT).is_err());
    }
}
