use agentry_core::{ChatMessage, Memory, Result, ToolCall, Tracer};
use agentry_function::{
    Function, FunctionConfig, FunctionKind, FunctionResult, Runnable, TraceContext,
};
use agentry_llm::LLMOutput;
use agentry_prompt::{CallOptions, PromptManager};
use agentry_tools::Toolkit;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::turn::{AgentInput, AgentOutput, TurnState, TurnTracker, run_tool_turn};

pub(crate) struct AgentLoop {
    pub(crate) name: String,
    pub(crate) llm: Function,
    pub(crate) toolkit: Option<Toolkit>,
    pub(crate) prompt: Arc<PromptManager>,
    pub(crate) options: CallOptions,
    pub(crate) tool_retries: u32,
}

impl AgentLoop {
    fn call_options(&self) -> CallOptions {
        let mut options = self.options.clone();
        if let Some(toolkit) = &self.toolkit {
            options.tools = toolkit.definitions();
        }
        options
    }

    #[instrument(skip(self, ctx, content), fields(agent = %self.name))]
    async fn run_loop(&self, ctx: &TraceContext, content: String) -> Result<AgentOutput> {
        info!(input_len = content.len(), "Starting chat");

        let options = self.call_options();
        let mut tracker = TurnTracker::new(self.tool_retries);
        let mut all_tool_calls: Vec<ToolCall> = Vec::new();
        let mut next = ChatMessage::user(content);

        loop {
            let request = self.prompt.prepare_request(&next, &options).await?;
            let result = self.llm.call(ctx, serde_json::to_value(&request)?).await?;
            self.prompt.add_memory(next).await?;

            let output = LLMOutput::from_value(&result.into_output()?)?;
            match tracker.on_output(&output)? {
                TurnState::ToolCall => {
                    let (tool_message, _) =
                        run_tool_turn(ctx, &self.prompt, self.toolkit.as_ref(), &output).await?;
                    all_tool_calls.extend(output.tool_calls.iter().cloned());
                    next = tool_message;
                    tracker.resume()?;
                }
                _ => {
                    self.prompt.add_memory(output.message.clone()).await?;
                    info!(tool_calls = all_tool_calls.len(), "Chat completed");
                    return Ok(AgentOutput::new(output, all_tool_calls, &tracker));
                }
            }
        }
    }
}

#[async_trait]
impl Runnable for AgentLoop {
    async fn run(&self, ctx: &TraceContext, input: Value) -> Result<Value> {
        let content = AgentInput::content(&input)?;
        let output = self.run_loop(ctx, content).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Tool-calling conversation loop over one LLM function, a toolkit and a
/// prompt manager.
///
/// Each call asks the model, runs any requested tools and feeds their result
/// back until the model answers with a plain assistant message. At most
/// `tool_retries` consecutive tool turns are allowed per call.
#[derive(Clone)]
pub struct Agent {
    function: Function,
    prompt: Arc<PromptManager>,
    tracer: Arc<dyn Tracer>,
}

impl Agent {
    pub(crate) fn new(
        agent: AgentLoop,
        config: FunctionConfig,
        tracer: Arc<dyn Tracer>,
    ) -> Self {
        let prompt = agent.prompt.clone();
        let function = Function::builder(agent.name.clone())
            .kind(FunctionKind::AgentTurn)
            .input_validator(AgentInput)
            .config(config)
            .build(agent);
        Self {
            function,
            prompt,
            tracer,
        }
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn prompt(&self) -> &PromptManager {
        &self.prompt
    }

    pub fn memory(&self) -> Option<&Arc<dyn Memory>> {
        self.prompt.memory()
    }

    /// Runs one conversation turn under `ctx` and reports the discriminated result.
    pub async fn call(&self, ctx: &TraceContext, input: &str) -> Result<FunctionResult> {
        self.function.call(ctx, json!({ "content": input })).await
    }

    /// Runs one conversation turn under a new trace, turning a reported failure
    /// back into an error.
    pub async fn chat(&self, input: &str) -> Result<AgentOutput> {
        let ctx = TraceContext::new(self.tracer.clone());
        let output = self.call(&ctx, input).await?.into_output()?;
        ctx.tracer().flush().await;
        AgentOutput::from_value(&output)
    }

    pub async fn reset(&self) -> Result<()> {
        if let Some(memory) = self.prompt.memory() {
            memory.clear().await?;
        }
        debug!(agent = %self.name(), "Agent session reset");
        Ok(())
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name())
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::builder::AgentBuilder;
    use agentry_core::{ErrorKind, ExecutionState, FinishReason, LLMError, LLMResponse, Role};
    use agentry_function::InMemoryTracer;
    use agentry_llm::MockLLMProvider;
    use agentry_memory::BufferMemory;
    use agentry_tools::Tool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn user_property_tool(calls: Arc<AtomicUsize>) -> Tool {
        Tool::from_fn(
            "get_user_property",
            "Retrieve any information about the user",
            json!({
                "type": "object",
                "properties": {
                    "asked_property": {"type": "string", "enum": ["birthday", "name"]}
                },
                "required": ["asked_property"]
            }),
            move |args| {
                calls.fetch_add(1, Ordering::SeqCst);
                match args.get("asked_property").and_then(Value::as_str) {
                    Some("birthday") => Ok(json!("January 1st")),
                    Some("name") => Ok(json!("Elias")),
                    other => anyhow::bail!("unknown property {:?}", other),
                }
            },
        )
    }

    pub(crate) fn birthday_call() -> LLMResponse {
        LLMResponse::tool_calls(vec![ToolCall::new(
            "call_1",
            "get_user_property",
            r#"{"asked_property":"birthday"}"#,
        )])
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[tokio::test]
    async fn test_birthday_conversation() {
        init_tracing();
        let mock = MockLLMProvider::new("test");
        mock.set_scripted(
            vec![
                birthday_call(),
                LLMResponse::new("Your birthday is on January 1st", FinishReason::Stop),
            ],
            false,
        );
        let memory = BufferMemory::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let agent = AgentBuilder::new("birthday")
            .system_prompt("You answer questions about the user's profile.")
            .llm(Arc::new(mock.clone()))
            .memory(Arc::new(memory.clone()))
            .tool(user_property_tool(calls.clone()))
            .build()
            .unwrap();

        let output = agent.chat("What is my birthday?").await.unwrap();

        assert!(output.response.contains("January 1st"));
        assert_eq!(output.tool_turns, 1);
        assert_eq!(output.llm_turns, 2);
        assert_eq!(output.tool_calls.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let messages = memory.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "What is my birthday?");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].tool_calls[0].name, "get_user_property");
        assert_eq!(messages[2].role, Role::Tool);
        assert_eq!(messages[2].content, "January 1st");
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[3].role, Role::Assistant);
        assert!(messages[3].content.contains("January 1st"));
    }

    #[tokio::test]
    async fn test_second_request_carries_tool_result_and_tools() {
        let mock = MockLLMProvider::new("test");
        mock.set_scripted(
            vec![birthday_call(), LLMResponse::new("January 1st", FinishReason::Stop)],
            false,
        );
        let agent = AgentBuilder::new("birthday")
            .llm(Arc::new(mock.clone()))
            .tool(user_property_tool(Arc::new(AtomicUsize::new(0))))
            .build()
            .unwrap();

        agent.chat("When is my birthday?").await.unwrap();

        let history = mock.call_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].request.tools.len(), 1);
        assert_eq!(history[0].request.tools[0].name, "get_user_property");

        let second = &history[1].request.messages;
        let last = second.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.content, "January 1st");
        assert_eq!(second[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_tool_retries_exceeded() {
        let mock = MockLLMProvider::new("test");
        mock.add_response(birthday_call());
        let calls = Arc::new(AtomicUsize::new(0));

        let agent = AgentBuilder::new("looping")
            .llm(Arc::new(mock.clone()))
            .tool(user_property_tool(calls.clone()))
            .tool_retries(2)
            .build()
            .unwrap();

        let result = agent.call(&TraceContext::noop(), "Loop forever").await.unwrap();

        assert!(!result.is_success());
        assert_eq!(result.kind(), Some(ErrorKind::ToolRetriesExceeded));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(mock.call_count(), 3);
        assert_eq!(agent.function().last_state(), Some(ExecutionState::Failed));

        let err = agent.chat("Again").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolRetriesExceeded);
    }

    #[tokio::test]
    async fn test_llm_failure_aborts_turn() {
        let mock = MockLLMProvider::new("test");
        mock.set_error(LLMError::ServiceUnavailable("down".into()));
        let memory = BufferMemory::new();

        let agent = AgentBuilder::new("failing")
            .llm(Arc::new(mock.clone()))
            .memory(Arc::new(memory.clone()))
            .build()
            .unwrap();

        let result = agent.call(&TraceContext::noop(), "hello").await.unwrap();
        assert_eq!(result.kind(), Some(ErrorKind::Provider));
        assert_eq!(mock.call_count(), 1);
        // the outgoing message is persisted before the result is inspected
        assert_eq!(memory.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported() {
        let mock = MockLLMProvider::new("test");
        mock.add_response(LLMResponse::tool_calls(vec![ToolCall::new(
            "call_1",
            "delete_everything",
            "{}",
        )]));
        let agent = AgentBuilder::new("agent")
            .llm(Arc::new(mock))
            .tool(user_property_tool(Arc::new(AtomicUsize::new(0))))
            .build()
            .unwrap();

        let result = agent.call(&TraceContext::noop(), "hi").await.unwrap();
        assert_eq!(result.kind(), Some(ErrorKind::ToolNotFound));
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let agent = AgentBuilder::new("agent")
            .llm(Arc::new(MockLLMProvider::default()))
            .build()
            .unwrap();

        let result = agent.call(&TraceContext::noop(), "  ").await.unwrap();
        assert_eq!(result.kind(), Some(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn test_nested_trace() {
        let mock = MockLLMProvider::new("test");
        mock.set_scripted(
            vec![birthday_call(), LLMResponse::new("January 1st", FinishReason::Stop)],
            false,
        );
        let tracer = Arc::new(InMemoryTracer::new());
        let agent = AgentBuilder::new("traced")
            .llm(Arc::new(mock))
            .tool(user_property_tool(Arc::new(AtomicUsize::new(0))))
            .tracer(tracer.clone())
            .build()
            .unwrap();

        agent.chat("birthday?").await.unwrap();

        let root = &tracer.find("traced")[0];
        assert!(root.observation.parent_id.is_none());
        let children = tracer.children_of(&root.observation.id);
        let names: Vec<&str> = children.iter().map(|c| c.observation.name.as_str()).collect();
        assert_eq!(names.iter().filter(|n| **n == "traced.llm").count(), 2);
        assert!(names.contains(&"traced.toolkit"));

        let toolkit = &tracer.find("traced.toolkit")[0];
        let tool_spans = tracer.children_of(&toolkit.observation.id);
        assert_eq!(tool_spans[0].observation.name, "get_user_property");
        assert_eq!(tracer.open_count(), 0);
        assert!(tracer.flush_count() > 0);
    }

    #[tokio::test]
    async fn test_reset_clears_memory() {
        let memory = BufferMemory::new();
        let agent = AgentBuilder::new("agent")
            .llm(Arc::new(MockLLMProvider::default()))
            .memory(Arc::new(memory.clone()))
            .build()
            .unwrap();

        agent.chat("hello").await.unwrap();
        assert_eq!(memory.messages().len(), 2);

        agent.reset().await.unwrap();
        assert!(memory.messages().is_empty());
    }
}
