//! Provider wrapper that retries transient failures with exponential backoff

use agentry_core::{LLMError, LLMProvider, LLMRequest, LLMResponse, LLMStream};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Adds up to a quarter of the wait at random.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff_ms as f64 * self.multiplier.powi(attempt as i32 - 1);
        let mut wait_ms = base.min(self.max_backoff_ms as f64) as u64;
        if self.jitter && wait_ms > 0 {
            wait_ms += rand::thread_rng().gen_range(0..=wait_ms / 4);
        }
        Duration::from_millis(wait_ms)
    }

    fn wait_for(&self, error: &LLMError, attempt: u32) -> Duration {
        match error {
            LLMError::RateLimit {
                retry_after: Some(after),
            } => (*after).min(Duration::from_millis(self.max_backoff_ms)),
            _ => self.backoff(attempt),
        }
    }
}

/// Retries rate-limit, timeout, unavailable, network and 5xx errors.
/// For streams only opening the stream is retried.
pub struct RetryingProvider {
    inner: Arc<dyn LLMProvider>,
    config: RetryConfig,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LLMProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, LLMError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LLMError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() || attempt >= self.config.max_attempts => {
                    return Err(e);
                }
                Err(e) => {
                    let wait = self.config.wait_for(&e, attempt);
                    warn!(
                        "[{}] {} failed (attempt {}/{}), retrying in {:?}: {}",
                        self.inner.provider_name(),
                        operation,
                        attempt,
                        self.config.max_attempts,
                        wait,
                        e
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[async_trait]
impl LLMProvider for RetryingProvider {
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError> {
        self.with_retry("complete", || self.inner.complete(request))
            .await
    }

    async fn complete_stream(&self, request: &LLMRequest) -> Result<LLMStream, LLMError> {
        self.with_retry("complete_stream", || self.inner.complete_stream(request))
            .await
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLLMProvider;
    use agentry_core::ChatMessage;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            multiplier: 2.0,
            jitter: false,
        }
    }

    fn request() -> LLMRequest {
        LLMRequest::new("m", vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let mock = MockLLMProvider::new("test");
        mock.set_response("ok");
        mock.queue_error(LLMError::Timeout);
        mock.queue_error(LLMError::RateLimit { retry_after: None });

        let provider = RetryingProvider::new(Arc::new(mock.clone()), fast());
        let response = provider.complete(&request()).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mock = MockLLMProvider::new("test");
        mock.set_error(LLMError::ServiceUnavailable("down".into()));

        let provider = RetryingProvider::new(Arc::new(mock.clone()), fast());
        assert!(provider.complete(&request()).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let mock = MockLLMProvider::new("test");
        mock.set_error(LLMError::ContentFiltered("blocked".into()));

        let provider = RetryingProvider::new(Arc::new(mock.clone()), fast());
        assert!(provider.complete(&request()).await.is_err());
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_backoff_calculation() {
        let config = RetryConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
            multiplier: 2.0,
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(400));
        assert_eq!(config.backoff(5), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_bounds() {
        let config = RetryConfig {
            initial_backoff_ms: 100,
            jitter: true,
            ..RetryConfig::default()
        };
        let wait = config.backoff(1);
        assert!(wait >= Duration::from_millis(100) && wait <= Duration::from_millis(125));
    }

    #[test]
    fn test_yaml_config() {
        let config: RetryConfig = serde_yaml::from_str("max_attempts: 5").unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_backoff_ms, 500);
    }
}
