//! LLM provider traits

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;
use thiserror::Error;

use crate::types::{LLMChunk, LLMRequest, LLMResponse};

/// Finite, non-restartable sequence of completion chunks. Dropping it must release
/// the underlying connection.
pub type LLMStream = BoxStream<'static, Result<LLMChunk, LLMError>>;

/// Core LLM provider trait
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError>;

    async fn complete_stream(&self, request: &LLMRequest) -> Result<LLMStream, LLMError>;

    fn provider_name(&self) -> &str;
}

/// LLM error types
#[derive(Debug, Clone, Error)]
pub enum LLMError {
    #[error("API error: {message}")]
    API {
        message: String,
        status: Option<u16>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {retry_after:?}")]
    RateLimit { retry_after: Option<Duration> },

    #[error("Request timed out")]
    Timeout,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Content filtered: {0}")]
    ContentFiltered(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl LLMError {
    /// Transient failures a client may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            LLMError::RateLimit { .. }
            | LLMError::Timeout
            | LLMError::ServiceUnavailable(_)
            | LLMError::Network(_) => true,
            LLMError::API { status, .. } => matches!(status, Some(500..=599)),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for LLMError {
    fn from(err: serde_json::Error) -> Self {
        LLMError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LLMError::Timeout.is_retryable());
        assert!(LLMError::RateLimit { retry_after: None }.is_retryable());
        assert!(LLMError::ServiceUnavailable("503".into()).is_retryable());
        assert!(
            LLMError::API {
                message: "bad gateway".into(),
                status: Some(502)
            }
            .is_retryable()
        );
        assert!(
            !LLMError::API {
                message: "bad request".into(),
                status: Some(400)
            }
            .is_retryable()
        );
        assert!(!LLMError::ContentFiltered("nope".into()).is_retryable());
    }
}
