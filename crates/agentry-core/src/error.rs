use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ExecutionState;
use crate::traits::llm::LLMError;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("[{function}|{function_id}] invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        function: String,
        function_id: String,
        from: ExecutionState,
        to: ExecutionState,
    },

    #[error("LLM error: {0}")]
    LLM(#[from] LLMError),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool arguments for {tool}: {message}")]
    InvalidToolArguments { tool: String, message: String },

    #[error("Tool retries exceeded: {0} consecutive tool turns allowed")]
    ToolRetriesExceeded(u32),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure reported by a nested function call, keeping its original kind.
    #[error("{message}")]
    Nested { kind: ErrorKind, message: String },

    #[error("{0}")]
    Other(String),
}

/// Discriminant of an [`AgentError`], used as the key of fallback strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidOutput,
    InvalidStateTransition,
    Provider,
    ToolExecution,
    ToolNotFound,
    InvalidToolArguments,
    ToolRetriesExceeded,
    Evaluation,
    Memory,
    Serialization,
    Config,
    Other,
}

impl ErrorKind {
    /// Contract violations are fatal to the current call and never recovered.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidInput | ErrorKind::InvalidOutput | ErrorKind::InvalidStateTransition
        )
    }
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::InvalidInput(_) => ErrorKind::InvalidInput,
            AgentError::InvalidOutput(_) => ErrorKind::InvalidOutput,
            AgentError::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            AgentError::LLM(_) => ErrorKind::Provider,
            AgentError::ToolExecution(_) => ErrorKind::ToolExecution,
            AgentError::ToolNotFound(_) => ErrorKind::ToolNotFound,
            AgentError::InvalidToolArguments { .. } => ErrorKind::InvalidToolArguments,
            AgentError::ToolRetriesExceeded(_) => ErrorKind::ToolRetriesExceeded,
            AgentError::Evaluation(_) => ErrorKind::Evaluation,
            AgentError::Memory(_) => ErrorKind::Memory,
            AgentError::Serialization(_) | AgentError::Yaml(_) => ErrorKind::Serialization,
            AgentError::Config(_) | AgentError::IoError(_) => ErrorKind::Config,
            AgentError::Nested { kind, .. } => *kind,
            AgentError::Other(_) => ErrorKind::Other,
        }
    }

    pub fn is_contract_violation(&self) -> bool {
        self.kind().is_contract_violation()
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AgentError::InvalidInput("x".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            AgentError::LLM(LLMError::Network("down".into())).kind(),
            ErrorKind::Provider
        );
        assert_eq!(
            AgentError::ToolRetriesExceeded(2).kind(),
            ErrorKind::ToolRetriesExceeded
        );
    }

    #[test]
    fn test_state_transition_message() {
        let err = AgentError::InvalidStateTransition {
            function: "summarizer".into(),
            function_id: "abc".into(),
            from: ExecutionState::Init,
            to: ExecutionState::Complete,
        };
        let msg = err.to_string();
        assert!(msg.contains("summarizer"));
        assert!(msg.contains("INIT"));
        assert!(msg.contains("COMPLETE"));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_nested_keeps_kind() {
        let err = AgentError::Nested {
            kind: ErrorKind::ToolExecution,
            message: "tool exploded".into(),
        };
        assert_eq!(err.kind(), ErrorKind::ToolExecution);
        assert_eq!(err.to_string(), "tool exploded");
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::ToolRetriesExceeded).unwrap();
        assert_eq!(json, "\"tool_retries_exceeded\"");
    }
}
