//! Tool callable interface and wire-level tool description

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// What the model sees of a tool: name, description and JSON-schema parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// OpenAI-style `{"type": "function", "function": {...}}` envelope.
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// The body of a tool. Receives the model's arguments as named values.
#[async_trait]
pub trait ToolCallable: Send + Sync {
    async fn invoke(&self, arguments: Map<String, Value>) -> anyhow::Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_envelope() {
        let def = ToolDefinition {
            name: "get_user_property".into(),
            description: "Look up a user property".into(),
            parameters: json!({"type": "object"}),
        };
        let value = def.to_openai();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "get_user_property");
        assert_eq!(value["function"]["parameters"]["type"], "object");
    }
}
