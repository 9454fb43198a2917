use agentry_core::ChatMessage;
use agentry_llm::LLMStreamChunk;
use serde::{Deserialize, Serialize};

/// One item of an agent stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Text delta relayed from the model
    Content { text: String },
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, arguments: String },
    ToolCallEnd { id: String },
    /// Tool execution result
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },
    /// The conversation reached a terminal assistant message
    Done { response: String },
}

impl StreamChunk {
    pub fn content(text: impl Into<String>) -> Self {
        StreamChunk::Content { text: text.into() }
    }

    pub fn tool_start(id: impl Into<String>, name: impl Into<String>) -> Self {
        StreamChunk::ToolCallStart {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn tool_delta(id: impl Into<String>, arguments: impl Into<String>) -> Self {
        StreamChunk::ToolCallDelta {
            id: id.into(),
            arguments: arguments.into(),
        }
    }

    pub fn tool_end(id: impl Into<String>) -> Self {
        StreamChunk::ToolCallEnd { id: id.into() }
    }

    pub fn tool_result(
        id: impl Into<String>,
        name: impl Into<String>,
        output: impl Into<String>,
        success: bool,
    ) -> Self {
        StreamChunk::ToolResult {
            id: id.into(),
            name: name.into(),
            output: output.into(),
            success,
        }
    }

    /// Built from a tool-role message as returned by a toolkit.
    pub fn from_tool_message(message: &ChatMessage) -> Self {
        Self::tool_result(
            message.tool_call_id.clone().unwrap_or_default(),
            message.name.clone().unwrap_or_default(),
            message.content.clone(),
            true,
        )
    }

    pub fn done(response: impl Into<String>) -> Self {
        StreamChunk::Done {
            response: response.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamChunk::Done { .. })
    }

    pub fn is_content(&self) -> bool {
        matches!(self, StreamChunk::Content { .. })
    }
}

/// Relayed items for one model chunk. Tool-call events are only known once the
/// final chunk has assembled the calls.
pub(crate) fn relay(chunk: &LLMStreamChunk, include_tool_events: bool) -> Vec<StreamChunk> {
    let mut out = Vec::new();
    if !chunk.delta.is_empty() {
        out.push(StreamChunk::content(chunk.delta.clone()));
    }
    if include_tool_events && chunk.is_final() {
        for call in &chunk.tool_calls {
            out.push(StreamChunk::tool_start(&call.id, &call.name));
            out.push(StreamChunk::tool_delta(&call.id, &call.arguments));
            out.push(StreamChunk::tool_end(&call.id));
        }
    }
    out
}

/// Configuration for streaming behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Include tool call and tool result events in the stream
    #[serde(default = "default_true")]
    pub include_tool_events: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_tool_events: true,
        }
    }
}
