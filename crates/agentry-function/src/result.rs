use agentry_core::{AgentError, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminated outcome of a function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FunctionResult {
    Success { output: Value },
    Error { message: String, kind: ErrorKind },
}

impl FunctionResult {
    pub fn success(output: Value) -> Self {
        FunctionResult::Success { output }
    }

    pub fn error(err: &AgentError) -> Self {
        FunctionResult::Error {
            message: err.to_string(),
            kind: err.kind(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FunctionResult::Success { .. })
    }

    pub fn output(&self) -> Option<&Value> {
        match self {
            FunctionResult::Success { output } => Some(output),
            FunctionResult::Error { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            FunctionResult::Success { .. } => None,
            FunctionResult::Error { message, .. } => Some(message),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            FunctionResult::Success { .. } => None,
            FunctionResult::Error { kind, .. } => Some(*kind),
        }
    }

    /// Unwraps the output, turning a reported error back into an [`AgentError`]
    /// that keeps its kind.
    pub fn into_output(self) -> Result<Value> {
        match self {
            FunctionResult::Success { output } => Ok(output),
            FunctionResult::Error { message, kind } => Err(AgentError::Nested { kind, message }),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
