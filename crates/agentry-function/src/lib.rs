//! Function execution lifecycle for Agentry
//!
//! Every unit of work (LLM call, tool call, evaluator, chain, agent turn) is a
//! [`Function`]: a [`Runnable`] wrapped with input/output validation,
//! post-processing, evaluation, fallback strategies and tracing.

pub mod chain;
pub mod config;
pub mod context;
pub mod evaluator;
pub mod fallback;
pub mod function;
mod lifecycle;
pub mod result;
pub mod runnable;
pub mod stream;
pub mod tracers;
pub mod validator;

pub use chain::{Parallel, Sequential};
pub use config::FunctionConfig;
pub use context::TraceContext;
pub use evaluator::{Evaluation, Evaluator, FnEvaluator, FunctionEvaluator};
pub use fallback::{FallbackStrategies, FallbackStrategy};
pub use function::{Function, FunctionBuilder};
pub use lifecycle::ExecutionRecord;
pub use result::FunctionResult;
pub use runnable::{FnRunnable, FunctionKind, Runnable, StreamingRunnable, ValueStream, from_fn};
pub use stream::{ResultStream, StreamingFunction};
pub use tracers::{InMemoryTracer, LoggingTracer, NoopTracer, RecordedObservation, RecordedScore};
pub use validator::{AnyObject, SchemaValidator, TypedValidator, ValidationError, Validator};
