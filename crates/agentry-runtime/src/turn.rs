//! Conversation-turn state shared by the blocking and streaming agents

use agentry_core::{AgentError, ChatMessage, Result, TokenUsage, ToolCall};
use agentry_function::{TraceContext, ValidationError, Validator};
use agentry_llm::LLMOutput;
use agentry_prompt::PromptManager;
use agentry_tools::{ToolCallRequest, Toolkit};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    AwaitingLlm,
    ToolCall,
    Terminal,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::AwaitingLlm => "AWAITING_LLM",
            TurnState::ToolCall => "TOOL_CALL",
            TurnState::Terminal => "TERMINAL",
        };
        f.write_str(name)
    }
}

/// Drives `AWAITING_LLM -> {TOOL_CALL, TERMINAL}` and `TOOL_CALL -> AWAITING_LLM`,
/// counting tool turns against the retry budget.
#[derive(Debug)]
pub(crate) struct TurnTracker {
    state: TurnState,
    tool_retries: u32,
    tool_turns: u32,
    llm_turns: u32,
}

impl TurnTracker {
    pub(crate) fn new(tool_retries: u32) -> Self {
        Self {
            state: TurnState::AwaitingLlm,
            tool_retries,
            tool_turns: 0,
            llm_turns: 0,
        }
    }

    pub(crate) fn tool_turns(&self) -> u32 {
        self.tool_turns
    }

    pub(crate) fn llm_turns(&self) -> u32 {
        self.llm_turns
    }

    fn transition(&mut self, to: TurnState) -> Result<()> {
        let allowed = matches!(
            (self.state, to),
            (TurnState::AwaitingLlm, TurnState::ToolCall)
                | (TurnState::AwaitingLlm, TurnState::Terminal)
                | (TurnState::ToolCall, TurnState::AwaitingLlm)
        );
        if !allowed {
            return Err(AgentError::Other(format!(
                "invalid turn transition from {} to {}",
                self.state, to
            )));
        }
        debug!(from = %self.state, to = %to, turn = self.llm_turns, "turn transition");
        self.state = to;
        Ok(())
    }

    /// Classifies a model output. A tool turn beyond the budget fails with
    /// `ToolRetriesExceeded`.
    pub(crate) fn on_output(&mut self, output: &LLMOutput) -> Result<TurnState> {
        self.llm_turns += 1;
        if !output.is_tool_call() {
            self.transition(TurnState::Terminal)?;
            return Ok(TurnState::Terminal);
        }

        if self.tool_turns >= self.tool_retries {
            warn!(
                tool_turns = self.tool_turns,
                limit = self.tool_retries,
                "tool retries exhausted"
            );
            return Err(AgentError::ToolRetriesExceeded(self.tool_retries));
        }
        self.tool_turns += 1;
        self.transition(TurnState::ToolCall)?;
        Ok(TurnState::ToolCall)
    }

    pub(crate) fn resume(&mut self) -> Result<()> {
        self.transition(TurnState::AwaitingLlm)
    }
}

/// Input accepted by agents: `{"content": "<non-empty text>"}`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AgentInput;

impl AgentInput {
    pub(crate) fn content(input: &Value) -> Result<String> {
        input
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AgentError::InvalidInput("missing content".into()))
    }
}

impl Validator for AgentInput {
    fn validate(&self, value: Value) -> std::result::Result<Value, ValidationError> {
        match value.get("content") {
            Some(Value::String(text)) if !text.trim().is_empty() => Ok(value),
            Some(Value::String(_)) => Err(ValidationError::new("$.content: input cannot be empty")),
            Some(_) => Err(ValidationError::new("$.content: expected string")),
            None => Err(ValidationError::new("$.content: required")),
        }
    }

    fn schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {"content": {"type": "string"}},
            "required": ["content"]
        }))
    }
}

/// Final result of an agent conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub response: String,
    pub message: ChatMessage,
    /// Every tool call made on the way, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub llm_turns: u32,
    pub tool_turns: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentOutput {
    pub(crate) fn new(output: LLMOutput, tool_calls: Vec<ToolCall>, tracker: &TurnTracker) -> Self {
        Self {
            response: output.message.content.clone(),
            message: output.message,
            tool_calls,
            llm_turns: tracker.llm_turns(),
            tool_turns: tracker.tool_turns(),
            usage: output.usage,
            model: output.model,
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| AgentError::InvalidOutput(format!("not an agent output: {}", e)))
    }
}

/// Runs the tool part of a tool turn: records the intent, dispatches the batch
/// and returns the tool messages in request order. Every result but the last
/// is written to memory here; the last one becomes the next turn's input.
pub(crate) async fn run_tool_turn(
    ctx: &TraceContext,
    prompt: &PromptManager,
    toolkit: Option<&Toolkit>,
    output: &LLMOutput,
) -> Result<(ChatMessage, Vec<ChatMessage>)> {
    if output.tool_calls.is_empty() {
        return Err(AgentError::InvalidOutput(
            "tool turn without tool calls".into(),
        ));
    }
    let requests = output
        .tool_calls
        .iter()
        .map(ToolCallRequest::from_call)
        .collect::<Result<Vec<_>>>()?;

    let Some(toolkit) = toolkit else {
        return Err(AgentError::ToolNotFound(requests[0].name.clone()));
    };

    prompt.add_memory(output.message.clone()).await?;

    let results = toolkit.dispatch(ctx, requests).await?.tool_results;
    let Some((next, earlier)) = results.split_last() else {
        return Err(AgentError::InvalidOutput("toolkit returned no results".into()));
    };
    for message in earlier {
        prompt.add_memory(message.clone()).await?;
    }
    Ok((next.clone(), results.clone()))
}
