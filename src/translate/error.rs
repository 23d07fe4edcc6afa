//! Map internal failures onto the external error taxonomy.
//!
//! Two jobs live here: classifying provider error responses into
//! [`ProxyError`] kinds, and translating any [`ProxyError`] into the external
//! `{"error": {...}}` body plus HTTP status. Provider messages are never
//! copied into the envelope; every caller-visible message is composed here
//! from text we control, so account ids, resource identifiers, and stack
//! traces cannot leak.

use crate::error::ProxyError;

use super::openai_types::ErrorResponse;

pub const INVALID_REQUEST_ERROR: &str = "invalid_request_error";
pub const AUTHENTICATION_ERROR: &str = "authentication_error";
pub const RATE_LIMIT_ERROR: &str = "rate_limit_error";
pub const MODEL_ERROR: &str = "model_error";
pub const SERVER_ERROR: &str = "server_error";

/// Translate an internal error into the external envelope and HTTP status.
pub fn translate(err: &ProxyError) -> (ErrorResponse, u16) {
    match err {
        // Validation failures carry locally composed messages; safe to echo.
        ProxyError::InvalidRequest { message } => {
            (ErrorResponse::new(INVALID_REQUEST_ERROR, message.clone()), 400)
        }
        ProxyError::ModelNotFound { model } => (
            ErrorResponse::new(
                INVALID_REQUEST_ERROR,
                format!("The model '{model}' does not exist or is not configured"),
            ),
            400,
        ),
        ProxyError::Authentication { .. } => (
            ErrorResponse::new(
                AUTHENTICATION_ERROR,
                "The backing provider rejected the service credentials",
            ),
            401,
        ),
        ProxyError::RateLimit { .. } => (
            ErrorResponse::new(
                RATE_LIMIT_ERROR,
                "Request rate exceeds the provider limit. Retry after a short delay",
            ),
            429,
        ),
        ProxyError::ModelUnavailable { .. } => (
            ErrorResponse::new(
                MODEL_ERROR,
                "The model is temporarily unavailable or overloaded",
            ),
            503,
        ),
        // Everything else, including unclassified provider faults, surfaces
        // as a generic server error with no internal detail.
        _ => (
            ErrorResponse::new(SERVER_ERROR, "The proxy encountered an internal error"),
            500,
        ),
    }
}

/// Classify a provider error response into a [`ProxyError`] kind.
///
/// `error_type` is the provider's error code, taken from the response payload
/// or an error-type header when present. The provider's own message text is
/// discarded here — callers log it before classifying — so that `translate`
/// can never echo it. Even the invalid-request kind gets a fixed caller-safe
/// message, since provider validation text routinely names internal resources.
pub fn classify_provider_error(status: u16, error_type: Option<&str>) -> ProxyError {
    let code = error_type.unwrap_or("").rsplit('#').next().unwrap_or("");

    match code {
        "ValidationException" => {
            ProxyError::invalid_request("The provider rejected the request parameters")
        }
        "AccessDeniedException" | "UnauthorizedException" => {
            ProxyError::authentication("provider denied access")
        }
        "ThrottlingException" | "ServiceQuotaExceededException" => {
            ProxyError::rate_limit("provider throttled the request")
        }
        "ModelNotReadyException" | "ServiceUnavailableException" | "ModelTimeoutException" => {
            ProxyError::model_unavailable("provider reported the model unavailable")
        }
        _ => match status {
            400 => ProxyError::invalid_request("The provider rejected the request parameters"),
            401 | 403 => ProxyError::authentication("provider denied access"),
            429 => ProxyError::rate_limit("provider throttled the request"),
            503 => ProxyError::model_unavailable("provider reported the model unavailable"),
            _ => ProxyError::provider(format!("provider returned status {status}")),
        },
    }
}
