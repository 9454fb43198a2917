use agentry_core::{
    AgentError, ChatMessage, Result, ToolCall, ToolCallable, ToolDefinition,
};
use agentry_function::{
    FallbackStrategies, Function, FunctionConfig, FunctionKind, FunctionResult, Runnable,
    SchemaValidator, TraceContext,
};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::callable::{AsyncFnTool, FnTool, TypedTool};
use crate::generate_schema;

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Parses the raw argument text of a model tool call. Malformed JSON is an
    /// `InvalidToolArguments` error.
    pub fn from_call(call: &ToolCall) -> Result<Self> {
        Ok(Self {
            id: Some(call.id.clone()),
            name: call.name.clone(),
            arguments: Value::Object(call.parse_arguments()?),
        })
    }

    /// Arguments as a mapping. Argument text that is still a JSON string is parsed.
    pub fn argument_map(&self) -> Result<Map<String, Value>> {
        match &self.arguments {
            Value::Object(map) => Ok(map.clone()),
            Value::Null => Ok(Map::new()),
            Value::String(raw) => {
                ToolCall::new(self.id.clone().unwrap_or_default(), &self.name, raw)
                    .parse_arguments()
            }
            other => Err(AgentError::InvalidToolArguments {
                tool: self.name.clone(),
                message: format!("expected a mapping, got {}", other),
            }),
        }
    }
}

struct ToolRunnable {
    name: String,
    callable: Arc<dyn ToolCallable>,
}

#[async_trait]
impl Runnable for ToolRunnable {
    async fn run(&self, _ctx: &TraceContext, input: Value) -> Result<Value> {
        let arguments = match input.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        let tool_call_id = input
            .get("tool_call_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        debug!(tool = %self.name, "invoking tool");
        let value = self
            .callable
            .invoke(arguments)
            .await
            .map_err(|e| AgentError::ToolExecution(format!("[{}] {:#}", self.name, e)))?;

        let content = match value {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let response = ChatMessage::tool(self.name.clone(), tool_call_id, content);
        Ok(json!({ "response": response }))
    }
}

/// Wraps the parameter schema under `arguments`, lifting its `$defs` and
/// `$schema` to the root so `#/$defs/...` references still resolve.
fn input_schema(mut parameters: Value) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "tool_call_id": {"type": "string"}
        },
        "required": ["arguments"]
    });
    if let Value::Object(params) = &mut parameters {
        for key in ["$defs", "definitions", "$schema"] {
            if let Some(hoisted) = params.remove(key) {
                schema[key] = hoisted;
            }
        }
    }
    schema["properties"]["arguments"] = parameters;
    schema
}

/// A named callable exposed to the model.
///
/// Calling it validates `arguments` against the parameter schema, invokes the
/// callable with them and wraps the return value as a tool-role message.
#[derive(Clone)]
pub struct Tool {
    definition: ToolDefinition,
    callable: Arc<dyn ToolCallable>,
    function: Function,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        callable: impl ToolCallable + 'static,
    ) -> Self {
        let definition = ToolDefinition {
            name: name.into(),
            description: description.into(),
            parameters,
        };
        let callable: Arc<dyn ToolCallable> = Arc::new(callable);
        let function = Self::build_function(
            &definition,
            callable.clone(),
            FunctionConfig::default(),
            FallbackStrategies::new(),
        );

        Self {
            definition,
            callable,
            function,
        }
    }

    /// Rebuilds the wrapping function with the given switches and recovery
    /// policies.
    pub fn configure(self, config: FunctionConfig, fallbacks: FallbackStrategies) -> Self {
        let function =
            Self::build_function(&self.definition, self.callable.clone(), config, fallbacks);
        Self { function, ..self }
    }

    fn build_function(
        definition: &ToolDefinition,
        callable: Arc<dyn ToolCallable>,
        config: FunctionConfig,
        fallbacks: FallbackStrategies,
    ) -> Function {
        Function::builder(definition.name.clone())
            .kind(FunctionKind::ToolCall)
            .config(config)
            .fallbacks(fallbacks)
            .input_validator(SchemaValidator::new(input_schema(
                definition.parameters.clone(),
            )))
            .output_validator(SchemaValidator::new(json!({
                "type": "object",
                "required": ["response"]
            })))
            .build(ToolRunnable {
                name: definition.name.clone(),
                callable,
            })
    }

    pub fn from_fn<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        f: F,
    ) -> Self
    where
        F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, description, parameters, FnTool::new(f))
    }

    pub fn from_async_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        f: F,
    ) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(name, description, parameters, AsyncFnTool::new(f))
    }

    /// Tool whose parameter schema is derived from `Args`.
    pub fn typed<Args, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        f: F,
    ) -> Self
    where
        Args: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(
            name,
            description,
            generate_schema::<Args>(),
            TypedTool::<Args, F>::new(f),
        )
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub async fn call(
        &self,
        ctx: &TraceContext,
        arguments: Map<String, Value>,
        tool_call_id: Option<String>,
    ) -> Result<FunctionResult> {
        let mut input = json!({ "arguments": arguments });
        if let Some(id) = tool_call_id {
            input["tool_call_id"] = Value::String(id);
        }
        self.function.call(ctx, input).await
    }

    /// Calls the tool and returns the tool-role message, turning a reported
    /// failure back into an error.
    pub async fn invoke(
        &self,
        ctx: &TraceContext,
        arguments: Map<String, Value>,
        tool_call_id: Option<String>,
    ) -> Result<ChatMessage> {
        let output = self
            .call(ctx, arguments, tool_call_id)
            .await?
            .into_output()?;
        let response = output
            .get("response")
            .cloned()
            .ok_or_else(|| AgentError::InvalidOutput(format!("[{}] missing response", self.name())))?;
        Ok(serde_json::from_value(response)?)
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}
