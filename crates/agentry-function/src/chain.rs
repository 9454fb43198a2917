//! Sequential and parallel composition of functions

use agentry_core::{AgentError, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Value, json};
use tracing::debug;

use crate::context::TraceContext;
use crate::function::Function;
use crate::runnable::{FunctionKind, Runnable};

/// Feeds the output of each child into the next one.
pub struct Sequential {
    children: Vec<Function>,
}

impl Sequential {
    pub fn new(children: Vec<Function>) -> Self {
        Self { children }
    }

    pub fn into_function(self, name: impl Into<String>) -> Function {
        Function::builder(name)
            .kind(FunctionKind::Chain)
            .build(self)
    }
}

#[async_trait]
impl Runnable for Sequential {
    async fn run(&self, ctx: &TraceContext, input: Value) -> Result<Value> {
        let mut current = input;
        for child in &self.children {
            debug!("sequential step: {}", child.name());
            current = child.call(ctx, current).await?.into_output()?;
        }
        Ok(current)
    }
}

/// Calls child `i` with `inputs[i]` concurrently and returns `{"outputs": [...]}`
/// in child order. The first failure aborts the others.
pub struct Parallel {
    children: Vec<Function>,
}

impl Parallel {
    pub fn new(children: Vec<Function>) -> Self {
        Self { children }
    }

    pub fn into_function(self, name: impl Into<String>) -> Function {
        Function::builder(name)
            .kind(FunctionKind::Chain)
            .build(self)
    }
}

#[async_trait]
impl Runnable for Parallel {
    async fn run(&self, ctx: &TraceContext, input: Value) -> Result<Value> {
        let inputs = input
            .get("inputs")
            .and_then(Value::as_array)
            .ok_or_else(|| AgentError::InvalidInput("expected an 'inputs' list".into()))?;

        if inputs.len() != self.children.len() {
            return Err(AgentError::InvalidInput(format!(
                "{} inputs for {} parallel functions",
                inputs.len(),
                self.children.len()
            )));
        }

        let calls = self
            .children
            .iter()
            .zip(inputs.iter().cloned())
            .map(|(child, input)| async move { child.call(ctx, input).await?.into_output() });
        let outputs = try_join_all(calls).await?;
        Ok(json!({ "outputs": outputs }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runnable::from_fn;
    use agentry_core::ErrorKind;
    use std::time::Duration;

    fn add(name: &str, n: i64) -> Function {
        Function::new(
            name,
            from_fn(move |input: Value| async move {
                let x = input["x"].as_i64().unwrap_or(0);
                Ok(json!({"x": x + n}))
            }),
        )
    }

    #[tokio::test]
    async fn test_sequential_threads_output() {
        let chain = Sequential::new(vec![add("plus1", 1), add("plus10", 10)]).into_function("chain");
        let result = chain.call(&TraceContext::noop(), json!({"x": 1})).await.unwrap();
        assert_eq!(result.output(), Some(&json!({"x": 12})));
        assert_eq!(chain.kind(), FunctionKind::Chain);
    }

    #[tokio::test]
    async fn test_sequential_stops_on_error() {
        let broken = Function::new(
            "broken",
            from_fn(|_input: Value| async move { Err(AgentError::ToolExecution("no".into())) }),
        );
        let chain = Sequential::new(vec![broken, add("plus1", 1)]).into_function("chain");
        let result = chain.call(&TraceContext::noop(), json!({"x": 1})).await.unwrap();
        assert_eq!(result.kind(), Some(ErrorKind::ToolExecution));
    }

    #[tokio::test]
    async fn test_parallel_preserves_order() {
        let slow = Function::new(
            "slow",
            from_fn(|input: Value| async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(json!({"from": "slow", "x": input["x"]}))
            }),
        );
        let fast = Function::new(
            "fast",
            from_fn(|input: Value| async move { Ok(json!({"from": "fast", "x": input["x"]})) }),
        );

        let par = Parallel::new(vec![slow, fast]).into_function("par");
        let result = par
            .call(&TraceContext::noop(), json!({"inputs": [{"x": 1}, {"x": 2}]}))
            .await
            .unwrap();
        let outputs = result.output().unwrap()["outputs"].as_array().unwrap().clone();
        assert_eq!(outputs[0]["from"], "slow");
        assert_eq!(outputs[1]["x"], 2);
    }

    #[tokio::test]
    async fn test_parallel_input_count_mismatch() {
        let par = Parallel::new(vec![add("a", 1)]).into_function("par");
        let result = par
            .call(&TraceContext::noop(), json!({"inputs": []}))
            .await
            .unwrap();
        assert_eq!(result.kind(), Some(ErrorKind::InvalidInput));
    }
}
