//! Collaborator interfaces consumed by the core

pub mod examples;
pub mod llm;
pub mod memory;
pub mod tokens;
pub mod tool;
pub mod tracer;

pub use examples::ExampleSelector;
pub use llm::LLMProvider;
pub use memory::Memory;
pub use tokens::TokenCounter;
pub use tool::ToolCallable;
pub use tracer::Tracer;
