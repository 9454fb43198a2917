//! LLM call functions, provider retry, model catalog and mock provider for Agentry

mod call;
mod catalog;
mod mock;
mod retry;
mod stream;

pub use call::{LLMCall, LLMOutput};
pub use catalog::{DEFAULT_MODEL, ModelCatalog};
pub use mock::{MockCall, MockLLMProvider};
pub use retry::{RetryConfig, RetryingProvider};
pub use stream::{LLMStreamCall, LLMStreamChunk};
