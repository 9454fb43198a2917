//! Agent specification types

mod llm;

pub use llm::LLMConfig;

use agentry_core::{AgentError, Result};
use agentry_function::{FallbackStrategies, FunctionConfig};
use agentry_llm::RetryConfig;
use agentry_prompt::PromptConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::streaming::StreamingConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,

    /// System role, examples, formatting instruction, budget and model catalog.
    #[serde(flatten)]
    pub prompt: PromptConfig,

    #[serde(default)]
    pub llm: LLMConfig,

    /// Consecutive tool-call turns allowed per conversation turn.
    #[serde(default = "default_tool_retries")]
    pub tool_retries: u32,

    /// Applies to the agent's function and to every child function it creates.
    #[serde(default)]
    pub function: FunctionConfig,

    #[serde(default)]
    pub fallbacks: ChildFallbacks,

    /// Wraps the provider with retries on transient errors when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    #[serde(default)]
    pub streaming: StreamingConfig,
}

/// Recovery policies for the functions an agent creates around its model
/// and its tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChildFallbacks {
    #[serde(default)]
    pub llm: FallbackStrategies,

    /// Applied to each tool built from the agent's tool list.
    #[serde(default)]
    pub tools: FallbackStrategies,
}

fn default_tool_retries() -> u32 {
    3
}

fn default_system_role() -> String {
    "You are a helpful assistant".to_string()
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            name: "Agent".to_string(),
            prompt: PromptConfig {
                system_role: default_system_role(),
                ..PromptConfig::default()
            },
            llm: LLMConfig::default(),
            tool_retries: default_tool_retries(),
            function: FunctionConfig::default(),
            fallbacks: ChildFallbacks::default(),
            retry: None,
            streaming: StreamingConfig::default(),
        }
    }
}

impl AgentSpec {
    /// Parses and validates.
    pub fn from_yaml(yaml_content: &str) -> Result<Self> {
        let spec: AgentSpec = serde_yaml::from_str(yaml_content)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(AgentError::IoError)?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AgentError::Config("Agent name cannot be empty".to_string()));
        }

        if self.prompt.system_role.is_empty() {
            return Err(AgentError::Config(
                "System role cannot be empty".to_string(),
            ));
        }

        let budget = &self.prompt.budget;
        if budget.min_completion_tokens > budget.max_completion_tokens {
            return Err(AgentError::Config(format!(
                "min_completion_tokens ({}) exceeds max_completion_tokens ({})",
                budget.min_completion_tokens, budget.max_completion_tokens
            )));
        }
        if budget.fallback_threshold <= 0.0 {
            return Err(AgentError::Config(
                "fallback_threshold must be positive".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AgentError::Config(format!(
                "temperature {} out of range 0..=2",
                self.llm.temperature
            )));
        }

        if self.retry.as_ref().is_some_and(|r| r.max_attempts == 0) {
            return Err(AgentError::Config(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        self.fallbacks.llm.validate()?;
        self.fallbacks.tools.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_spec_minimal() {
        let yaml = r#"
name: TestAgent
system_role: "You are a helpful assistant."
"#;
        let spec = AgentSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "TestAgent");
        assert_eq!(spec.tool_retries, 3);
        assert!(spec.prompt.time_aware);
        assert!(spec.retry.is_none());
        assert!(spec.streaming.enabled);
        assert_eq!(spec.fallbacks, ChildFallbacks::default());
    }

    #[test]
    fn test_agent_spec_full() {
        let yaml = r#"
name: ProfileAgent
system_role: "You answer questions about the user's profile."
formatting_instruction: "Answer in one sentence."
time_aware: false
memory_window: 20
examples:
  - user: "What is my name?"
    assistant: "Your name is Elias."
budget:
  max_completion_tokens: 2048
  fallback_threshold: 0.8
catalog:
  default_model: local-model
  context_limits:
    local-model: 8192
  fallbacks: {}
llm:
  temperature: 0.2
  completion_multiplier: 1.5
tool_retries: 5
function:
  strict_evaluators: true
fallbacks:
  llm:
    provider:
      strategy: retry
      max_attempts: 2
  tools:
    tool_execution:
      strategy: report
retry:
  max_attempts: 4
streaming:
  include_tool_events: false
"#;
        let spec = AgentSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.tool_retries, 5);
        assert!(!spec.prompt.time_aware);
        assert_eq!(spec.prompt.memory_window, Some(20));
        assert_eq!(spec.prompt.examples.len(), 1);
        assert_eq!(spec.prompt.budget.max_completion_tokens, 2048);
        assert_eq!(spec.prompt.budget.min_completion_tokens, 500);
        assert_eq!(spec.prompt.catalog.context_limit("local-model"), Some(8192));
        assert!(spec.prompt.catalog.fallback_for("gpt-4").is_none());
        assert_eq!(spec.llm.completion_multiplier, Some(1.5));
        assert!(spec.function.strict_evaluators);
        assert_eq!(
            spec.fallbacks.llm.get(agentry_core::ErrorKind::Provider),
            Some(&agentry_function::FallbackStrategy::retry(2, 100))
        );
        assert!(spec.fallbacks.tools.get(agentry_core::ErrorKind::ToolExecution).is_some());
        assert_eq!(spec.retry.as_ref().unwrap().max_attempts, 4);
        assert_eq!(spec.retry.as_ref().unwrap().initial_backoff_ms, 500);
        assert!(!spec.streaming.include_tool_events);
    }

    #[test]
    fn test_agent_spec_validation_empty_name() {
        let yaml = r#"
name: ""
system_role: "You are helpful."
"#;
        let err = AgentSpec::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_agent_spec_validation_empty_role() {
        let err = AgentSpec::from_yaml("name: Agent").unwrap_err();
        assert!(err.to_string().contains("System role"));
    }

    #[test]
    fn test_agent_spec_validation_budget() {
        let yaml = r#"
name: Agent
system_role: "You are helpful."
budget:
  min_completion_tokens: 5000
"#;
        assert!(AgentSpec::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_agent_spec_rejects_contract_fallbacks() {
        let yaml = r#"
name: Agent
system_role: "You are helpful."
fallbacks:
  tools:
    invalid_input:
      strategy: default
      value: {}
"#;
        let err = AgentSpec::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_agent_spec_malformed_yaml() {
        let err = AgentSpec::from_yaml("name: [unclosed").unwrap_err();
        assert_eq!(err.kind(), agentry_core::ErrorKind::Serialization);
    }

    #[test]
    fn test_agent_spec_defaults() {
        let spec = AgentSpec::default();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.prompt.system_role, "You are a helpful assistant");
    }

    #[test]
    fn test_agent_spec_from_file() {
        let path = std::env::temp_dir().join(format!("agentry-spec-{}.yaml", std::process::id()));
        std::fs::write(&path, "name: FileAgent\nsystem_role: \"Hi\"\n").unwrap();
        let spec = AgentSpec::from_yaml_file(&path).unwrap();
        assert_eq!(spec.name, "FileAgent");
        std::fs::remove_file(&path).unwrap();

        let err = AgentSpec::from_yaml_file(&path).unwrap_err();
        assert!(matches!(err, AgentError::IoError(_)));
    }
}
