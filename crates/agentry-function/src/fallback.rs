//! Recovery policies keyed by error kind

use agentry_core::{AgentError, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Report the failure as a structured error result.
    Report,

    /// Substitute a fixed output and report success.
    Default { value: Value },

    /// Re-run the whole call, waiting `backoff_ms * 2^(attempt - 1)` between attempts.
    Retry {
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
        #[serde(default = "default_backoff_ms")]
        backoff_ms: u64,
    },
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

impl FallbackStrategy {
    pub fn retry(max_attempts: u32, backoff_ms: u64) -> Self {
        FallbackStrategy::Retry {
            max_attempts,
            backoff_ms,
        }
    }

    pub fn default_value(value: Value) -> Self {
        FallbackStrategy::Default { value }
    }
}

pub(crate) fn retry_delay(backoff_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(backoff_ms.saturating_mul(factor))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackStrategies(HashMap<ErrorKind, FallbackStrategy>);

impl FallbackStrategies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ErrorKind, strategy: FallbackStrategy) -> Self {
        self.insert(kind, strategy);
        self
    }

    /// Contract violations cannot be recovered, so their registrations are dropped.
    pub fn insert(&mut self, kind: ErrorKind, strategy: FallbackStrategy) {
        if kind.is_contract_violation() {
            warn!("ignoring {:?} fallback for {:?}", strategy, kind);
            return;
        }
        self.0.insert(kind, strategy);
    }

    /// Rejects maps that register a strategy for a contract violation.
    pub fn validate(&self) -> Result<()> {
        match self.0.keys().find(|kind| kind.is_contract_violation()) {
            Some(kind) => Err(AgentError::Config(format!(
                "no fallback strategy may be registered for {:?}",
                kind
            ))),
            None => Ok(()),
        }
    }

    /// Drops every strategy registered for a contract violation.
    pub(crate) fn recoverable(mut self) -> Self {
        self.0.retain(|kind, strategy| {
            if kind.is_contract_violation() {
                warn!("ignoring {:?} fallback for {:?}", strategy, kind);
                return false;
            }
            true
        });
        self
    }

    pub fn get(&self, kind: ErrorKind) -> Option<&FallbackStrategy> {
        self.0.get(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_yaml_strategies() {
        let yaml = r#"
tool_execution:
  strategy: retry
  max_attempts: 2
provider:
  strategy: default
  value: {text: "unavailable"}
memory:
  strategy: report
"#;
        let strategies: FallbackStrategies = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            strategies.get(ErrorKind::ToolExecution),
            Some(&FallbackStrategy::retry(2, 100))
        );
        assert_eq!(
            strategies.get(ErrorKind::Provider),
            Some(&FallbackStrategy::default_value(json!({"text": "unavailable"})))
        );
        assert_eq!(
            strategies.get(ErrorKind::Memory),
            Some(&FallbackStrategy::Report)
        );
        assert!(strategies.get(ErrorKind::Config).is_none());
        assert!(strategies.validate().is_ok());
    }

    #[test]
    fn test_contract_violations_cannot_be_registered() {
        let mut strategies = FallbackStrategies::new();
        strategies.insert(ErrorKind::InvalidInput, FallbackStrategy::retry(2, 1));
        assert!(strategies.is_empty());

        let yaml = "invalid_output:\n  strategy: default\n  value: {}\n";
        let loaded: FallbackStrategies = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(loaded.validate().unwrap_err().kind(), ErrorKind::Config);
        assert!(loaded.recoverable().is_empty());
    }

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(retry_delay(100, 1), Duration::from_millis(100));
        assert_eq!(retry_delay(100, 2), Duration::from_millis(200));
        assert_eq!(retry_delay(100, 3), Duration::from_millis(400));
    }
}
