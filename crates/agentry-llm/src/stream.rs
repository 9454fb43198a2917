//! Streaming LLM call as a function

use agentry_core::{
    AgentError, ChatMessage, FinishReason, LLMChunk, LLMProvider, ResponseType, Result,
    TokenUsage, ToolCall,
};
use agentry_function::{
    FallbackStrategies, FunctionConfig, FunctionKind, SchemaValidator, StreamingFunction,
    StreamingRunnable, TraceContext, ValueStream,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::call::{LLMOutput, parse_request, request_schema, usage_of};

/// One streamed step: the new delta plus everything accumulated so far.
/// Only the final chunk carries a `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMStreamChunk {
    #[serde(default)]
    pub delta: String,
    #[serde(default)]
    pub completion: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl LLMStreamChunk {
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| AgentError::InvalidOutput(format!("not an LLM stream chunk: {}", e)))
    }

    pub fn is_final(&self) -> bool {
        self.response_type.is_some()
    }

    /// The classified output, available on the final chunk only.
    pub fn to_output(&self) -> Option<LLMOutput> {
        let response_type = self.response_type?;
        let message = match response_type {
            ResponseType::Tool => ChatMessage::assistant_tool_calls(self.tool_calls.clone()),
            ResponseType::Assistant => ChatMessage::assistant(self.completion.clone()),
        };
        Some(LLMOutput {
            response_type,
            message,
            completion: self.completion.clone(),
            tool_calls: self.tool_calls.clone(),
            finish_reason: self.finish_reason.clone().unwrap_or(FinishReason::Stop),
            usage: self.usage,
            model: self.model.clone(),
        })
    }
}

#[derive(Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Folds provider chunks into [`LLMStreamChunk`]s.
pub(crate) struct StreamAccumulator {
    model: String,
    completion: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    finished: bool,
}

impl StreamAccumulator {
    pub(crate) fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            completion: String::new(),
            tool_calls: BTreeMap::new(),
            finished: false,
        }
    }

    pub(crate) fn push(&mut self, chunk: LLMChunk) -> LLMStreamChunk {
        self.completion.push_str(&chunk.delta);
        if let Some(delta) = chunk.tool_call {
            let entry = self.tool_calls.entry(delta.index).or_default();
            if delta.id.is_some() {
                entry.id = delta.id;
            }
            if let Some(name) = delta.name {
                entry.name.push_str(&name);
            }
            entry.arguments.push_str(&delta.arguments);
        }

        match chunk.finish_reason {
            Some(reason) => self.finish(chunk.delta, reason, chunk.usage),
            None => LLMStreamChunk {
                delta: chunk.delta,
                completion: self.completion.clone(),
                response_type: None,
                tool_calls: Vec::new(),
                finish_reason: None,
                usage: None,
                model: None,
            },
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn finish(
        &mut self,
        delta: String,
        reason: FinishReason,
        usage: Option<TokenUsage>,
    ) -> LLMStreamChunk {
        self.finished = true;
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .iter()
            .map(|(index, partial)| ToolCall {
                id: partial
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("call_{}", index)),
                name: partial.name.clone(),
                arguments: partial.arguments.clone(),
            })
            .collect();
        let response_type = if reason == FinishReason::ToolCalls || !tool_calls.is_empty() {
            ResponseType::Tool
        } else {
            ResponseType::Assistant
        };

        LLMStreamChunk {
            delta,
            completion: self.completion.clone(),
            response_type: Some(response_type),
            tool_calls,
            finish_reason: Some(reason),
            usage,
            model: Some(self.model.clone()),
        }
    }
}

/// Streams one completion. Every provider chunk becomes one [`LLMStreamChunk`];
/// the last one is classified. Dropping the stream drops the provider stream.
pub struct LLMStreamCall {
    provider: Arc<dyn LLMProvider>,
}

impl LLMStreamCall {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    pub fn into_function(self, name: impl Into<String>) -> StreamingFunction {
        self.into_configured_function(name, FunctionConfig::default(), FallbackStrategies::new())
    }

    /// Retry strategies only apply while nothing has been forwarded yet.
    pub fn into_configured_function(
        self,
        name: impl Into<String>,
        config: FunctionConfig,
        fallbacks: FallbackStrategies,
    ) -> StreamingFunction {
        agentry_function::Function::builder(name)
            .kind(FunctionKind::LLMCall)
            .config(config)
            .fallbacks(fallbacks)
            .input_validator(SchemaValidator::new(request_schema()))
            .build_streaming(self)
    }
}

#[async_trait]
impl StreamingRunnable for LLMStreamCall {
    async fn run_stream(&self, _ctx: &TraceContext, input: Value) -> Result<ValueStream> {
        let request = parse_request(input)?;
        debug!(
            provider = self.provider.provider_name(),
            model = %request.model,
            "opening completion stream"
        );

        let mut upstream = self.provider.complete_stream(&request).await?;
        let mut accumulator = StreamAccumulator::new(request.model.clone());

        Ok(async_stream::stream! {
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(chunk) => {
                        let step = accumulator.push(chunk);
                        yield serde_json::to_value(step).map_err(AgentError::from);
                    }
                    Err(e) => {
                        yield Err(AgentError::from(e));
                        return;
                    }
                }
            }
            if !accumulator.is_finished() {
                let step = accumulator.finish(String::new(), FinishReason::Stop, None);
                yield serde_json::to_value(step).map_err(AgentError::from);
            }
        }
        .boxed())
    }

    fn usage(&self, output: &Value) -> Option<TokenUsage> {
        usage_of(output)
    }
}
