//! Evaluators score a function result and report the scores to the tracer

use agentry_core::{AgentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::context::TraceContext;
use crate::function::Function;
use crate::result::FunctionResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(default)]
    pub scores: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score(mut self, name: impl Into<String>, value: f64) -> Self {
        self.scores.insert(name.into(), value);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Scores a function result. `ctx.current()` is the observation of the
/// evaluated call.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, ctx: &TraceContext, result: &FunctionResult) -> Result<Evaluation>;
}

pub struct FnEvaluator<F> {
    name: String,
    f: F,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&FunctionResult) -> Result<Evaluation> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(&FunctionResult) -> Result<Evaluation> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, _ctx: &TraceContext, result: &FunctionResult) -> Result<Evaluation> {
        (self.f)(result)
    }
}

/// Runs a function as an evaluator. The function receives `{"result": ...}`
/// and must output an [`Evaluation`] mapping.
pub struct FunctionEvaluator {
    function: Function,
}

impl FunctionEvaluator {
    pub fn new(function: Function) -> Self {
        Self { function }
    }
}

#[async_trait]
impl Evaluator for FunctionEvaluator {
    fn name(&self) -> &str {
        self.function.name()
    }

    async fn evaluate(&self, ctx: &TraceContext, result: &FunctionResult) -> Result<Evaluation> {
        let output = self
            .function
            .call(ctx, json!({ "result": result }))
            .await?
            .into_output()?;
        serde_json::from_value(output).map_err(|e| {
            AgentError::Evaluation(format!("[{}] bad evaluation: {}", self.function.name(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runnable::{FunctionKind, from_fn};

    #[tokio::test]
    async fn test_fn_evaluator() {
        let ev = FnEvaluator::new("non_empty", |result: &FunctionResult| {
            let score = match result.output() {
                Some(Value::Object(map)) if !map.is_empty() => 1.0,
                _ => 0.0,
            };
            Ok(Evaluation::new().with_score("non_empty", score))
        });

        let eval = ev
            .evaluate(&TraceContext::noop(), &FunctionResult::success(json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(eval.scores["non_empty"], 1.0);
    }

    #[tokio::test]
    async fn test_function_evaluator() {
        let scorer = Function::builder("length_scorer")
            .kind(FunctionKind::Evaluation)
            .build(from_fn(|input: Value| async move {
                let score = if input["result"]["status"] == "success" { 1.0 } else { 0.0 };
                Ok(json!({"scores": {"ok": score}}))
            }));
        let ev = FunctionEvaluator::new(scorer);
        assert_eq!(ev.name(), "length_scorer");

        let eval = ev
            .evaluate(&TraceContext::noop(), &FunctionResult::success(json!({})))
            .await
            .unwrap();
        assert_eq!(eval.scores["ok"], 1.0);
    }
}
