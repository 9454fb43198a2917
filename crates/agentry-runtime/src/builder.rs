use std::path::Path;
use std::sync::Arc;

use agentry_core::{AgentError, ErrorKind, LLMProvider, Memory, Result, TokenCounter, Tracer};
use agentry_function::{FallbackStrategy, FunctionConfig, NoopTracer};
use agentry_llm::{LLMCall, LLMStreamCall, RetryConfig, RetryingProvider};
use agentry_memory::BufferMemory;
use agentry_prompt::{CallOptions, ExampleManager, PromptManager};
use agentry_tools::{Tool, Toolkit};
use tracing::info;

use crate::agent_stream::{AgentStream, AgentStreamLoop};
use crate::runtime::{Agent, AgentLoop};
use crate::spec::{AgentSpec, ChildFallbacks, LLMConfig};
use crate::streaming::StreamingConfig;

/// Assembles an [`Agent`] or [`AgentStream`] from a spec and injected
/// collaborators.
pub struct AgentBuilder {
    spec: AgentSpec,
    llm: Option<Arc<dyn LLMProvider>>,
    memory: Option<Arc<dyn Memory>>,
    tools: Vec<Tool>,
    toolkit: Option<Toolkit>,
    examples: Option<ExampleManager>,
    counter: Option<Arc<dyn TokenCounter>>,
    tracer: Option<Arc<dyn Tracer>>,
}

struct Parts {
    provider: Arc<dyn LLMProvider>,
    prompt: Arc<PromptManager>,
    toolkit: Option<Toolkit>,
    options: CallOptions,
    tracer: Arc<dyn Tracer>,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_spec(AgentSpec {
            name: name.into(),
            ..AgentSpec::default()
        })
    }

    pub fn from_spec(spec: AgentSpec) -> Self {
        Self {
            spec,
            llm: None,
            memory: None,
            tools: Vec::new(),
            toolkit: None,
            examples: None,
            counter: None,
            tracer: None,
        }
    }

    pub fn from_yaml(yaml_content: &str) -> Result<Self> {
        Ok(Self::from_spec(AgentSpec::from_yaml(yaml_content)?))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_spec(AgentSpec::from_yaml_file(path)?))
    }

    pub fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    pub fn llm(mut self, llm: Arc<dyn LLMProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn toolkit(mut self, toolkit: Toolkit) -> Self {
        self.toolkit = Some(toolkit);
        self
    }

    pub fn examples(mut self, examples: ExampleManager) -> Self {
        self.examples = Some(examples);
        self
    }

    pub fn token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.spec.prompt.system_role = prompt.into();
        self
    }

    pub fn formatting_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.spec.prompt.formatting_instruction = Some(instruction.into());
        self
    }

    pub fn time_aware(mut self, enabled: bool) -> Self {
        self.spec.prompt.time_aware = enabled;
        self
    }

    pub fn llm_config(mut self, config: LLMConfig) -> Self {
        self.spec.llm = config;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.spec.llm.model = Some(model.into());
        self
    }

    pub fn tool_retries(mut self, retries: u32) -> Self {
        self.spec.tool_retries = retries;
        self
    }

    pub fn function_config(mut self, config: FunctionConfig) -> Self {
        self.spec.function = config;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.spec.function.debug = debug;
        self
    }

    pub fn fallbacks(mut self, fallbacks: ChildFallbacks) -> Self {
        self.spec.fallbacks = fallbacks;
        self
    }

    /// Recovery policy for the model call, e.g. a `Provider` retry.
    pub fn llm_fallback(mut self, kind: ErrorKind, strategy: FallbackStrategy) -> Self {
        self.spec.fallbacks.llm.insert(kind, strategy);
        self
    }

    /// Recovery policy for each tool given through [`AgentBuilder::tool`].
    pub fn tool_fallback(mut self, kind: ErrorKind, strategy: FallbackStrategy) -> Self {
        self.spec.fallbacks.tools.insert(kind, strategy);
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.spec.retry = Some(config);
        self
    }

    pub fn streaming(mut self, config: StreamingConfig) -> Self {
        self.spec.streaming = config;
        self
    }

    fn parts(&mut self) -> Result<Parts> {
        self.spec.validate()?;

        let llm = self
            .llm
            .take()
            .ok_or_else(|| AgentError::Config("LLM provider is required".into()))?;
        let provider: Arc<dyn LLMProvider> = match &self.spec.retry {
            Some(config) => Arc::new(RetryingProvider::new(llm, config.clone())),
            None => llm,
        };

        let tools: Vec<Tool> = std::mem::take(&mut self.tools)
            .into_iter()
            .map(|tool| {
                tool.configure(self.spec.function.clone(), self.spec.fallbacks.tools.clone())
            })
            .collect();
        let toolkit = match (self.toolkit.take(), tools.is_empty()) {
            (Some(_), false) => {
                return Err(AgentError::Config(
                    "give either a toolkit or individual tools, not both".into(),
                ));
            }
            (Some(toolkit), true) => Some(toolkit),
            (None, false) => Some(Toolkit::with_config(
                format!("{}.toolkit", self.spec.name),
                tools,
                self.spec.function.clone(),
            )?),
            (None, true) => None,
        };

        let memory = self
            .memory
            .take()
            .unwrap_or_else(|| Arc::new(BufferMemory::new()));
        let mut prompt = PromptManager::from_config(self.spec.prompt.clone()).with_memory(memory);
        if let Some(examples) = self.examples.take() {
            prompt = prompt.with_examples(examples);
        }
        if let Some(counter) = self.counter.take() {
            prompt = prompt.with_counter(counter);
        }

        let tracer = self
            .tracer
            .take()
            .unwrap_or_else(|| Arc::new(NoopTracer));

        info!(
            agent = %self.spec.name,
            provider = provider.provider_name(),
            tools = toolkit.as_ref().map(|t| t.len()).unwrap_or(0),
            tool_retries = self.spec.tool_retries,
            "Agent built"
        );

        Ok(Parts {
            provider,
            prompt: Arc::new(prompt),
            toolkit,
            options: self.spec.llm.call_options(),
            tracer,
        })
    }

    pub fn build(mut self) -> Result<Agent> {
        let parts = self.parts()?;
        let name = self.spec.name.clone();
        let agent = AgentLoop {
            llm: LLMCall::new(parts.provider).into_configured_function(
                format!("{}.llm", name),
                self.spec.function.clone(),
                self.spec.fallbacks.llm.clone(),
            ),
            name,
            toolkit: parts.toolkit,
            prompt: parts.prompt,
            options: parts.options,
            tool_retries: self.spec.tool_retries,
        };
        Ok(Agent::new(agent, self.spec.function.clone(), parts.tracer))
    }

    pub fn build_stream(mut self) -> Result<AgentStream> {
        let parts = self.parts()?;
        if !self.spec.streaming.enabled {
            return Err(AgentError::Config(format!(
                "streaming is disabled for agent {}",
                self.spec.name
            )));
        }
        let name = self.spec.name.clone();
        let agent = AgentStreamLoop {
            llm: LLMStreamCall::new(parts.provider).into_configured_function(
                format!("{}.llm", name),
                self.spec.function.clone(),
                self.spec.fallbacks.llm.clone(),
            ),
            name,
            toolkit: parts.toolkit,
            prompt: parts.prompt,
            options: parts.options,
            tool_retries: self.spec.tool_retries,
            streaming: self.spec.streaming.clone(),
        };
        Ok(AgentStream::new(agent, self.spec.function.clone(), parts.tracer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::tests::user_property_tool;
    use agentry_core::LLMError;
    use agentry_llm::MockLLMProvider;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_llm_is_required() {
        let err = AgentBuilder::new("agent").build().unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_duplicate_tools_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let err = AgentBuilder::new("agent")
            .llm(Arc::new(MockLLMProvider::default()))
            .tool(user_property_tool(calls.clone()))
            .tool(user_property_tool(calls))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("get_user_property"));
    }

    #[test]
    fn test_streaming_disabled() {
        let err = AgentBuilder::new("agent")
            .llm(Arc::new(MockLLMProvider::default()))
            .streaming(StreamingConfig {
                enabled: false,
                ..StreamingConfig::default()
            })
            .build_stream()
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[tokio::test]
    async fn test_from_yaml() {
        let yaml = r#"
name: yaml-agent
system_role: "You are terse."
time_aware: false
formatting_instruction: "Reply in one word."
llm:
  model: gpt-4
  temperature: 0.3
"#;
        let mock = MockLLMProvider::new("test");
        mock.set_response("Hi");
        let agent = AgentBuilder::from_yaml(yaml)
            .unwrap()
            .llm(Arc::new(mock.clone()))
            .build()
            .unwrap();

        assert_eq!(agent.name(), "yaml-agent");
        agent.chat("Hello").await.unwrap();

        let request = mock.last_call().unwrap().request;
        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.messages[0].content, "You are terse.");
        assert_eq!(request.messages[1].content, "Reply in one word.");
        assert_eq!(request.messages[2].content, "Hello");
    }

    #[tokio::test]
    async fn test_retry_config_wraps_provider() {
        let mock = MockLLMProvider::new("test");
        mock.queue_error(LLMError::RateLimit {
            retry_after: None,
        });
        mock.set_response("recovered");

        let agent = AgentBuilder::new("retrying")
            .llm(Arc::new(mock.clone()))
            .retry(RetryConfig {
                initial_backoff_ms: 1,
                jitter: false,
                ..RetryConfig::default()
            })
            .build()
            .unwrap();

        let output = agent.chat("hello").await.unwrap();
        assert_eq!(output.response, "recovered");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_debug_mode_raises() {
        let mock = MockLLMProvider::new("test");
        mock.set_error(LLMError::ServiceUnavailable("down".into()));
        let agent = AgentBuilder::new("strict")
            .llm(Arc::new(mock))
            .debug(true)
            .build()
            .unwrap();

        let err = agent
            .call(&agentry_function::TraceContext::noop(), "hello")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        // raised by the model call itself, not rebuilt from a reported result
        assert!(matches!(err, AgentError::LLM(_)));
    }

    #[tokio::test]
    async fn test_llm_fallback_recovers_inside_chat() {
        let mock = MockLLMProvider::new("test");
        mock.queue_error(LLMError::ServiceUnavailable("restarting".into()));
        mock.set_response("Hello again");

        let agent = AgentBuilder::new("recovering")
            .llm(Arc::new(mock.clone()))
            .llm_fallback(ErrorKind::Provider, FallbackStrategy::retry(2, 1))
            .build()
            .unwrap();

        let output = agent.chat("hello").await.unwrap();
        assert_eq!(output.response, "Hello again");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(agent.memory().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tool_fallback_applies_to_agent_tools() {
        use agentry_core::{LLMResponse, ToolCall};
        use std::sync::atomic::{AtomicUsize, Ordering};

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let flaky = Tool::from_fn(
            "flaky_lookup",
            "Fails on the first call",
            serde_json::json!({"type": "object"}),
            move |_args| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("cold cache")
                }
                Ok(serde_json::json!("warm"))
            },
        );

        let mock = MockLLMProvider::new("test");
        mock.set_scripted(
            vec![
                LLMResponse::tool_calls(vec![ToolCall::new("call_1", "flaky_lookup", "{}")]),
                LLMResponse::new("done", agentry_core::FinishReason::Stop),
            ],
            false,
        );

        let agent = AgentBuilder::new("tooling")
            .llm(Arc::new(mock))
            .tool(flaky)
            .tool_fallback(ErrorKind::ToolExecution, FallbackStrategy::retry(2, 1))
            .build()
            .unwrap();

        let output = agent.chat("look it up").await.unwrap();
        assert_eq!(output.response, "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
