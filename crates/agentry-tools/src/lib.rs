//! Tools and toolkits for Agentry

mod callable;
mod tool;
mod toolkit;

pub use agentry_core::{ToolCallable, ToolDefinition};
pub use callable::{AsyncFnTool, FnTool, TypedTool};
pub use tool::{Tool, ToolCallRequest};
pub use toolkit::{Toolkit, ToolkitOutput};

use agentry_core::AgentError;
use schemars::JsonSchema;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),
    #[error("Duplicate tool name: {0}")]
    Duplicate(String),
}

impl From<ToolError> for AgentError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound(name) => AgentError::ToolNotFound(name),
            ToolError::Duplicate(name) => AgentError::Config(format!("duplicate tool name: {}", name)),
        }
    }
}

pub fn generate_schema<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}))
}
