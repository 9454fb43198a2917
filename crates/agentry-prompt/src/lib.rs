//! Prompt assembly, example selection and completion budget for Agentry

mod budget;
mod examples;
mod manager;
mod tokens;

pub use budget::{BudgetPolicy, RunConfig};
pub use examples::ExampleManager;
pub use manager::{CallOptions, PromptConfig, PromptManager};
pub use tokens::{EstimatingCounter, estimate_message_tokens, estimate_tokens};
