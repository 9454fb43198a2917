use agentry_core::{AgentError, ChatMessage, Memory, Result, Tracer};
use agentry_function::{
    FunctionConfig, FunctionKind, ResultStream, SchemaValidator, StreamingFunction,
    StreamingRunnable, TraceContext, ValueStream,
};
use agentry_llm::LLMStreamChunk;
use agentry_prompt::{CallOptions, PromptManager};
use agentry_tools::Toolkit;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

use crate::streaming::{StreamChunk, StreamingConfig, relay};
use crate::turn::{AgentInput, TurnState, TurnTracker, run_tool_turn};

pub(crate) struct AgentStreamLoop {
    pub(crate) name: String,
    pub(crate) llm: StreamingFunction,
    pub(crate) toolkit: Option<Toolkit>,
    pub(crate) prompt: Arc<PromptManager>,
    pub(crate) options: CallOptions,
    pub(crate) tool_retries: u32,
    pub(crate) streaming: StreamingConfig,
}

#[async_trait]
impl StreamingRunnable for AgentStreamLoop {
    async fn run_stream(&self, ctx: &TraceContext, input: Value) -> Result<ValueStream> {
        let content = AgentInput::content(&input)?;

        let name = self.name.clone();
        let llm = self.llm.clone();
        let toolkit = self.toolkit.clone();
        let prompt = self.prompt.clone();
        let mut options = self.options.clone();
        if let Some(toolkit) = &toolkit {
            options.tools = toolkit.definitions();
        }
        let tool_retries = self.tool_retries;
        let tool_events = self.streaming.include_tool_events;
        let ctx = ctx.clone();

        Ok(async_stream::try_stream! {
            info!(agent = %name, input_len = content.len(), "Starting streamed chat");
            let mut tracker = TurnTracker::new(tool_retries);
            let mut next = ChatMessage::user(content);

            loop {
                let request = prompt.prepare_request(&next, &options).await?;
                let mut upstream = llm.call_stream(&ctx, serde_json::to_value(&request)?);

                let mut last = None;
                while let Some(item) = upstream.next().await {
                    let item = item?;
                    if let Some(value) = item.output() {
                        let chunk = LLMStreamChunk::from_value(value)?;
                        for event in relay(&chunk, tool_events) {
                            yield serde_json::to_value(event)?;
                        }
                    }
                    last = Some(item);
                }
                drop(upstream);

                // the turn's stream is complete; memory and tools only from here on
                prompt.add_memory(next).await?;
                let last = last.ok_or_else(|| {
                    AgentError::InvalidOutput("model stream ended without output".into())
                })?;
                let output = LLMStreamChunk::from_value(&last.into_output()?)?
                    .to_output()
                    .ok_or_else(|| AgentError::InvalidOutput("last model chunk is unclassified".into()))?;

                match tracker.on_output(&output)? {
                    TurnState::ToolCall => {
                        let (tool_message, results) =
                            run_tool_turn(&ctx, &prompt, toolkit.as_ref(), &output).await?;
                        if tool_events {
                            for result in &results {
                                yield serde_json::to_value(StreamChunk::from_tool_message(result))?;
                            }
                        }
                        next = tool_message;
                        tracker.resume()?;
                    }
                    _ => {
                        prompt.add_memory(output.message.clone()).await?;
                        debug!(
                            llm_turns = tracker.llm_turns(),
                            tool_turns = tracker.tool_turns(),
                            "Streamed chat completed"
                        );
                        yield serde_json::to_value(StreamChunk::done(output.message.content))?;
                        break;
                    }
                }
            }
        }
        .boxed())
    }
}

/// Streaming counterpart of [`crate::Agent`].
///
/// Model deltas are relayed to the consumer as they arrive. Memory writes and
/// tool dispatch for a turn happen only after that turn's model stream has
/// ended. Dropping the stream drops the in-flight model stream.
#[derive(Clone)]
pub struct AgentStream {
    function: StreamingFunction,
    prompt: Arc<PromptManager>,
    tracer: Arc<dyn Tracer>,
}

impl AgentStream {
    pub(crate) fn new(
        agent: AgentStreamLoop,
        config: FunctionConfig,
        tracer: Arc<dyn Tracer>,
    ) -> Self {
        let prompt = agent.prompt.clone();
        let function = agentry_function::Function::builder(agent.name.clone())
            .kind(FunctionKind::AgentTurn)
            .input_validator(AgentInput)
            .output_validator(SchemaValidator::new(json!({
                "type": "object",
                "properties": {"type": {"type": "string", "enum": ["done"]}},
                "required": ["type"]
            })))
            .config(config)
            .build_streaming(agent);
        Self {
            function,
            prompt,
            tracer,
        }
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn function(&self) -> &StreamingFunction {
        &self.function
    }

    pub fn memory(&self) -> Option<&Arc<dyn Memory>> {
        self.prompt.memory()
    }

    /// Lifecycle-level stream: one `Success` per relayed chunk, or a final
    /// error result.
    pub fn call_stream(&self, ctx: &TraceContext, input: &str) -> ResultStream {
        self.function.call_stream(ctx, json!({ "content": input }))
    }

    /// Relayed chunks under a new trace. A reported failure ends the stream
    /// with an error.
    pub fn stream(&self, input: &str) -> BoxStream<'static, Result<StreamChunk>> {
        let ctx = TraceContext::new(self.tracer.clone());
        self.call_stream(&ctx, input)
            .map(|item| {
                let value = item?.into_output()?;
                serde_json::from_value::<StreamChunk>(value).map_err(AgentError::from)
            })
            .boxed()
    }

    pub async fn reset(&self) -> Result<()> {
        if let Some(memory) = self.prompt.memory() {
            memory.clear().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for AgentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentStream")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
