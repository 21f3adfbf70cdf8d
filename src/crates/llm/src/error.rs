//! Error types for LLM provider implementations.

use crate::redact::redact_secrets;
use parley_core::ModelError;
use thiserror::Error;

/// Result type for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when talking to a provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Failed to serialize/deserialize data.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// API authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// API key not found in environment.
    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    /// The endpoint answered 404 for the model or route.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Provider reported itself unavailable (5xx).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Response body did not match the chat completions shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Any other non-2xx answer.
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LlmError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::HttpError(e) => e.is_connect() || e.is_timeout(),
            LlmError::ServiceUnavailable(_)
            | LlmError::Timeout(_)
            | LlmError::RateLimitExceeded(_) => true,
            _ => false,
        }
    }

    /// Check if this error is due to authentication.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            LlmError::AuthenticationError(_) | LlmError::ApiKeyNotFound(_)
        )
    }

    /// Whether the model or its endpoint cannot be reached at all.
    pub fn is_unavailable(&self) -> bool {
        match self {
            LlmError::ModelNotFound(_) | LlmError::ServiceUnavailable(_) => true,
            LlmError::HttpError(e) => e.is_connect(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::SerializationError(err.to_string())
    }
}

/// Classify provider failures for the turn executor.
///
/// Missing models and unreachable endpoints surface to users as a connection
/// issue; everything else is a generic failure. Messages are scrubbed of
/// credentials because they end up in checkpoint metadata.
impl From<LlmError> for ModelError {
    fn from(err: LlmError) -> Self {
        let message = redact_secrets(&err.to_string()).into_owned();
        if err.is_unavailable() {
            ModelError::Unavailable(message)
        } else {
            ModelError::Failure(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_is_unavailable() {
        let err: ModelError = LlmError::ModelNotFound("deepseek-chatt".to_string()).into();
        assert!(err.is_unavailable());

        let err: ModelError = LlmError::ServiceUnavailable("503".to_string()).into();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_other_errors_are_failures() {
        for err in [
            LlmError::AuthenticationError("bad key".to_string()),
            LlmError::RateLimitExceeded("slow down".to_string()),
            LlmError::InvalidResponse("no choices".to_string()),
            LlmError::Timeout("60s".to_string()),
        ] {
            let mapped: ModelError = err.into();
            assert!(matches!(mapped, ModelError::Failure(_)));
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::RateLimitExceeded(String::new()).is_retryable());
        assert!(LlmError::ServiceUnavailable(String::new()).is_retryable());
        assert!(!LlmError::ModelNotFound(String::new()).is_retryable());
        assert!(!LlmError::AuthenticationError(String::new()).is_retryable());
        assert!(LlmError::ApiKeyNotFound(String::new()).is_auth_error());
    }

    #[test]
    fn test_mapped_message_is_redacted() {
        let err = LlmError::AuthenticationError(
            "Incorrect API key provided: sk-abcdefghijklmnopqrstuvwx".to_string(),
        );
        let mapped: ModelError = err.into();
        let text = mapped.to_string();
        assert!(!text.contains("sk-abcdefghijklmnopqrstuvwx"));
        assert!(text.contains("[REDACTED]"));
    }
}
