//! Adapters turning closures into tool callables

use agentry_core::ToolCallable;
use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::marker::PhantomData;

/// Synchronous callable, invoked directly on the calling task.
pub struct FnTool<F> {
    f: F,
}

impl<F> FnTool<F>
where
    F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ToolCallable for FnTool<F>
where
    F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync,
{
    async fn invoke(&self, arguments: Map<String, Value>) -> anyhow::Result<Value> {
        (self.f)(arguments)
    }
}

pub struct AsyncFnTool<F> {
    f: F,
}

impl<F, Fut> AsyncFnTool<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> ToolCallable for AsyncFnTool<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn invoke(&self, arguments: Map<String, Value>) -> anyhow::Result<Value> {
        (self.f)(arguments).await
    }
}

/// Deserializes the named arguments into `Args` before calling `f`.
pub struct TypedTool<Args, F> {
    f: F,
    _args: PhantomData<fn(Args)>,
}

impl<Args, F, Fut> TypedTool<Args, F>
where
    Args: DeserializeOwned + Send,
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _args: PhantomData,
        }
    }
}

#[async_trait]
impl<Args, F, Fut> ToolCallable for TypedTool<Args, F>
where
    Args: DeserializeOwned + Send,
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn invoke(&self, arguments: Map<String, Value>) -> anyhow::Result<Value> {
        let args: Args =
            serde_json::from_value(Value::Object(arguments)).context("invalid arguments")?;
        (self.f)(args).await
    }
}
