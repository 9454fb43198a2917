//! Core types and traits for the Agentry orchestration framework

pub mod error;
pub mod message;
pub mod state;
pub mod traits;
pub mod types;

pub use error::{AgentError, ErrorKind, Result};
pub use message::{ChatMessage, Role, ToolCall};
pub use state::ExecutionState;
pub use traits::examples::{Example, ExampleSelector};
pub use traits::llm::{LLMError, LLMProvider, LLMStream};
pub use traits::memory::{Memory, MemorySnapshot};
pub use traits::tokens::TokenCounter;
pub use traits::tool::{ToolCallable, ToolDefinition};
pub use traits::tracer::{Observation, ObservationKind, ObservationStatus, Tracer};
pub use types::{
    FinishReason, LLMChunk, LLMRequest, LLMResponse, ResponseType, TokenUsage, ToolCallDelta,
};
