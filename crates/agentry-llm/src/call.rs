//! Blocking LLM call as a function

use agentry_core::{
    AgentError, ChatMessage, FinishReason, LLMProvider, LLMRequest, LLMResponse, ResponseType,
    Result, TokenUsage, ToolCall,
};
use agentry_function::{
    FallbackStrategies, Function, FunctionConfig, FunctionKind, Runnable, SchemaValidator,
    TraceContext,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Output of an LLM call, classified as a terminal assistant message or a
/// tool-call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMOutput {
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub message: ChatMessage,
    #[serde(default)]
    pub completion: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl LLMOutput {
    pub fn from_response(response: LLMResponse, requested_model: &str) -> Self {
        let response_type = response.response_type();
        let message = match response_type {
            ResponseType::Tool => ChatMessage::assistant_tool_calls(response.tool_calls.clone()),
            ResponseType::Assistant => ChatMessage::assistant(response.content.clone()),
        };
        Self {
            response_type,
            message,
            completion: response.content,
            tool_calls: response.tool_calls,
            finish_reason: response.finish_reason,
            usage: response.usage,
            model: response.model.or_else(|| Some(requested_model.to_string())),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| AgentError::InvalidOutput(format!("not an LLM output: {}", e)))
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn is_tool_call(&self) -> bool {
        self.response_type == ResponseType::Tool
    }
}

pub(crate) fn request_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "messages": {"type": "array", "items": {"type": "object", "required": ["role"]}},
            "model": {"type": "string"},
            "temperature": {"type": "number"},
            "max_tokens": {"type": "integer"},
            "tools": {"type": "array"}
        },
        "required": ["messages", "model"]
    })
}

pub(crate) fn parse_request(input: Value) -> Result<LLMRequest> {
    serde_json::from_value(input)
        .map_err(|e| AgentError::InvalidInput(format!("not an LLM request: {}", e)))
}

pub(crate) fn usage_of(output: &Value) -> Option<TokenUsage> {
    output
        .get("usage")
        .and_then(|u| serde_json::from_value(u.clone()).ok())
}

/// Runs one completion against a provider.
///
/// Input is a serialized [`LLMRequest`]; output is a serialized [`LLMOutput`].
pub struct LLMCall {
    provider: Arc<dyn LLMProvider>,
}

impl LLMCall {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    pub fn into_function(self, name: impl Into<String>) -> Function {
        self.into_configured_function(name, FunctionConfig::default(), FallbackStrategies::new())
    }

    /// Same as [`LLMCall::into_function`] with the given switches and
    /// recovery policies, e.g. a `provider` retry.
    pub fn into_configured_function(
        self,
        name: impl Into<String>,
        config: FunctionConfig,
        fallbacks: FallbackStrategies,
    ) -> Function {
        Function::builder(name)
            .kind(FunctionKind::LLMCall)
            .config(config)
            .fallbacks(fallbacks)
            .input_validator(SchemaValidator::new(request_schema()))
            .output_validator(SchemaValidator::new(json!({
                "type": "object",
                "properties": {"type": {"type": "string", "enum": ["assistant", "tool"]}},
                "required": ["type", "message"]
            })))
            .build(self)
    }
}

#[async_trait]
impl Runnable for LLMCall {
    async fn run(&self, _ctx: &TraceContext, input: Value) -> Result<Value> {
        let request = parse_request(input)?;
        debug!(
            provider = self.provider.provider_name(),
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending completion request"
        );

        let response = self.provider.complete(&request).await?;
        LLMOutput::from_response(response, &request.model).to_value()
    }

    fn usage(&self, output: &Value) -> Option<TokenUsage> {
        usage_of(output)
    }
}
