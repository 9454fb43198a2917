//! Capability interfaces implemented by each kind of function

use agentry_core::{ObservationKind, Result, TokenUsage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

use crate::context::TraceContext;

pub type ValueStream = BoxStream<'static, Result<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Generic,
    LLMCall,
    ToolCall,
    Toolkit,
    Evaluation,
    AgentTurn,
    Chain,
}

impl FunctionKind {
    pub fn observation_kind(&self) -> ObservationKind {
        match self {
            FunctionKind::LLMCall => ObservationKind::Generation,
            _ => ObservationKind::Span,
        }
    }
}

/// The run step of a function, plus its optional post-processing.
#[async_trait]
pub trait Runnable: Send + Sync {
    async fn run(&self, ctx: &TraceContext, input: Value) -> Result<Value>;

    async fn process_output(&self, _ctx: &TraceContext, output: Value) -> Result<Value> {
        Ok(output)
    }

    /// Token usage to attach to the observation, read from the run output.
    fn usage(&self, _output: &Value) -> Option<TokenUsage> {
        None
    }
}

/// Streaming counterpart of [`Runnable`]: the run step yields chunks and the
/// last chunk stands for the whole output.
#[async_trait]
pub trait StreamingRunnable: Send + Sync {
    async fn run_stream(&self, ctx: &TraceContext, input: Value) -> Result<ValueStream>;

    async fn process_output(&self, _ctx: &TraceContext, output: Value) -> Result<Value> {
        Ok(output)
    }

    fn usage(&self, _output: &Value) -> Option<TokenUsage> {
        None
    }
}

/// Runnable backed by an async closure.
pub struct FnRunnable<F> {
    f: F,
}

pub fn from_fn<F, Fut>(f: F) -> FnRunnable<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    FnRunnable { f }
}

#[async_trait]
impl<F, Fut> Runnable for FnRunnable<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn run(&self, _ctx: &TraceContext, input: Value) -> Result<Value> {
        (self.f)(input).await
    }
}
