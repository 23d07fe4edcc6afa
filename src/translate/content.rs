//! Content normalization.
//!
//! Converts heterogeneous external message content (bare strings, mixed
//! text + image block lists) into the canonical part sequence the request
//! translator builds provider messages from. Image data URIs are decoded
//! and validated here, before any provider call is made.

use crate::error::{ProxyError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::openai_types::{ChatContent, ContentPart as WirePart};

/// Canonical, protocol-neutral content part. Order within a message is
/// semantically meaningful and always preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image { format: ImageFormat, data: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageFormat {
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }
}

/// Normalize raw external content into canonical parts.
///
/// A bare string becomes a single text part. Block lists keep their order.
/// Image blocks must be data URIs with a supported media type and a payload
/// within `max_image_bytes`; anything else is a validation error, never a
/// silent drop.
pub fn normalize(content: &ChatContent, max_image_bytes: usize) -> Result<Vec<ContentPart>> {
    match content {
        ChatContent::Text(text) => Ok(vec![ContentPart::Text(text.clone())]),
        ChatContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                WirePart::Text { text } => Ok(ContentPart::Text(text.clone())),
                WirePart::ImageUrl { image_url } => {
                    normalize_image(&image_url.url, max_image_bytes)
                }
            })
            .collect(),
    }
}

fn normalize_image(url: &str, max_image_bytes: usize) -> Result<ContentPart> {
    let Some(rest) = url.strip_prefix("data:") else {
        return Err(ProxyError::invalid_request(
            "Only data-URI images are supported",
        ));
    };

    let Some((media_type, payload)) = rest.split_once(";base64,") else {
        return Err(ProxyError::invalid_request(
            "Image data URI must be base64-encoded",
        ));
    };

    let Some(format) = ImageFormat::from_media_type(media_type) else {
        return Err(ProxyError::invalid_request(format!(
            "Unsupported image media type '{media_type}'. \
             Supported: image/jpeg, image/png, image/webp, image/gif"
        )));
    };

    let data = BASE64
        .decode(payload)
        .map_err(|e| ProxyError::invalid_request(format!("Invalid base64 image payload: {e}")))?;

    if data.len() > max_image_bytes {
        return Err(ProxyError::invalid_request(format!(
            "Image of {} bytes exceeds the {} byte limit",
            data.len(),
            max_image_bytes
        )));
    }

    Ok(ContentPart::Image { format, data })
}
