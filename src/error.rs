//! Error types for the proxy.
//!
//! Every failure on the request path is carried as a [`ProxyError`] so the
//! error translator has a single enumeration to map onto the external
//! taxonomy and HTTP status.

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Malformed or invalid request parameters, caught before any provider call.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The requested model is neither a configured alias nor a valid internal id.
    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    /// Missing or denied credentials on the provider side.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Provider-side throttling.
    #[error("Rate limited: {message}")]
    RateLimit { message: String },

    /// Model temporarily unavailable or overloaded.
    #[error("Model unavailable: {message}")]
    ModelUnavailable { message: String },

    /// Any other provider-side failure.
    #[error("Provider error: {message}")]
    Provider { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProxyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn model_not_found(model: impl Into<String>) -> Self {
        Self::ModelNotFound {
            model: model.into(),
        }
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication {
            message: msg.into(),
        }
    }

    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Self::RateLimit {
            message: msg.into(),
        }
    }

    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            message: msg.into(),
        }
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider {
            message: msg.into(),
        }
    }

    /// Short stable name for structured log records.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::Authentication { .. } => "authentication",
            Self::RateLimit { .. } => "rate_limit",
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::Provider { .. } => "provider",
            Self::Http(_) => "http",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Toml(_) => "toml",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
