//! Agentry: traced functions, tools and agent loops for LLM applications

pub mod agent {
    pub use agentry_runtime::{
        Agent, AgentBuilder, AgentOutput, AgentStream, StreamChunk, StreamingConfig, TurnState,
    };
}

pub mod error {
    pub use agentry_core::{AgentError, ErrorKind, Result};
}

pub mod function {
    pub use agentry_function::{
        AnyObject, Evaluation, Evaluator, ExecutionRecord, FallbackStrategies, FallbackStrategy,
        FnEvaluator, FnRunnable, Function, FunctionBuilder, FunctionConfig, FunctionEvaluator,
        FunctionKind, FunctionResult, Parallel, ResultStream, Runnable, SchemaValidator,
        Sequential, StreamingFunction, StreamingRunnable, TypedValidator, ValidationError,
        Validator, ValueStream, from_fn,
    };
}

pub mod llm {
    pub use agentry_core::{
        ChatMessage, FinishReason, LLMChunk, LLMError, LLMProvider, LLMRequest, LLMResponse,
        LLMStream, ResponseType, Role, TokenUsage, ToolCall, ToolCallDelta,
    };
    pub use agentry_llm::{
        DEFAULT_MODEL, LLMCall, LLMOutput, LLMStreamCall, LLMStreamChunk, MockCall,
        MockLLMProvider, ModelCatalog, RetryConfig, RetryingProvider,
    };
}

pub mod memory {
    use std::sync::Arc;

    pub use agentry_core::{Memory, MemorySnapshot};
    pub use agentry_memory::BufferMemory;

    pub fn create_memory() -> Arc<dyn Memory> {
        Arc::new(BufferMemory::new())
    }
}

pub mod prompt {
    pub use agentry_core::{Example, ExampleSelector, TokenCounter};
    pub use agentry_prompt::{
        BudgetPolicy, CallOptions, EstimatingCounter, ExampleManager, PromptConfig,
        PromptManager, RunConfig, estimate_message_tokens, estimate_tokens,
    };
}

pub mod spec {
    pub use agentry_runtime::spec::{AgentSpec, ChildFallbacks, LLMConfig};
}

pub mod state {
    pub use agentry_state::{
        ExecutionState, ExecutionStateMachine, ExecutionTransition, SUCCESS_PATH,
        StateMachineSnapshot, allowed_transitions, is_allowed,
    };
}

pub mod tools {
    pub use agentry_tools::{
        AsyncFnTool, FnTool, Tool, ToolCallRequest, ToolCallable, ToolDefinition, ToolError,
        Toolkit, ToolkitOutput, TypedTool, generate_schema,
    };
}

pub mod trace {
    pub use agentry_core::{Observation, ObservationKind, ObservationStatus, Tracer};
    pub use agentry_function::{
        InMemoryTracer, LoggingTracer, NoopTracer, RecordedObservation, RecordedScore,
        TraceContext,
    };
}

pub use agent::{Agent, AgentBuilder, AgentStream};
pub use error::{AgentError, ErrorKind, Result};
pub use function::{Function, FunctionResult};
pub use tools::{Tool, Toolkit};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_facade_wires_an_agent() {
        let mock = llm::MockLLMProvider::new("test");
        mock.set_response("pong");

        let tool = Tool::from_fn("echo", "Echo back", json!({"type": "object"}), |args| {
            Ok(serde_json::Value::Object(args))
        });
        let agent = AgentBuilder::new("facade")
            .llm(Arc::new(mock))
            .memory(memory::create_memory())
            .tool(tool)
            .build()
            .unwrap();

        let output = agent.chat("ping").await.unwrap();
        assert_eq!(output.response, "pong");
        assert_eq!(agent.memory().unwrap().len(), 2);
    }
}
