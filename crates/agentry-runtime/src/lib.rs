//! Agent tool-calling loop, streaming agent and agent specs for Agentry

mod agent_stream;
mod builder;
mod runtime;
mod streaming;
mod turn;

pub mod spec;

pub use agent_stream::AgentStream;
pub use builder::AgentBuilder;
pub use runtime::Agent;
pub use spec::{AgentSpec, ChildFallbacks, LLMConfig};
pub use streaming::{StreamChunk, StreamingConfig};
pub use turn::{AgentOutput, TurnState};
