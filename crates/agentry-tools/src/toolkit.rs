use agentry_core::{AgentError, ChatMessage, Result, ToolDefinition};
use agentry_function::{
    Function, FunctionConfig, FunctionKind, FunctionResult, Runnable, SchemaValidator,
    TraceContext,
};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::ToolError;
use crate::tool::{Tool, ToolCallRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolkitOutput {
    /// One tool message per request, in request order.
    pub tool_results: Vec<ChatMessage>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ToolkitOutput {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| AgentError::InvalidOutput(format!("not a toolkit output: {}", e)))
    }
}

struct ToolSet {
    tools: HashMap<String, Tool>,
    order: Vec<String>,
}

struct ToolkitRunnable {
    set: Arc<ToolSet>,
}

#[async_trait]
impl Runnable for ToolkitRunnable {
    async fn run(&self, ctx: &TraceContext, input: Value) -> Result<Value> {
        let requests: Vec<ToolCallRequest> = serde_json::from_value(
            input.get("tool_calls").cloned().unwrap_or(Value::Null),
        )
        .map_err(|e| AgentError::InvalidInput(format!("bad tool_calls: {}", e)))?;

        // resolve everything before dispatching anything
        let mut resolved = Vec::with_capacity(requests.len());
        for request in &requests {
            let tool = self
                .set
                .tools
                .get(&request.name)
                .ok_or_else(|| AgentError::ToolNotFound(request.name.clone()))?;
            resolved.push((tool, request.argument_map()?, request.id.clone()));
        }

        debug!(count = resolved.len(), "dispatching tool calls");
        let calls = resolved
            .into_iter()
            .map(|(tool, arguments, id)| tool.invoke(ctx, arguments, id));
        let tool_results = try_join_all(calls).await?;

        Ok(json!({
            "tool_results": tool_results,
            "tool_calls": requests,
        }))
    }
}

/// Registry of uniquely named tools with concurrent dispatch.
///
/// A batch is dispatched concurrently and results come back in request order.
/// The first failing tool aborts the batch and the rest are dropped.
#[derive(Clone)]
pub struct Toolkit {
    set: Arc<ToolSet>,
    function: Function,
}

impl Toolkit {
    pub fn new(name: impl Into<String>, tools: Vec<Tool>) -> std::result::Result<Self, ToolError> {
        Self::with_config(name, tools, FunctionConfig::default())
    }

    /// The config applies to the dispatching function; tools keep their own.
    pub fn with_config(
        name: impl Into<String>,
        tools: Vec<Tool>,
        config: FunctionConfig,
    ) -> std::result::Result<Self, ToolError> {
        let mut map = HashMap::with_capacity(tools.len());
        let mut order = Vec::with_capacity(tools.len());
        for tool in tools {
            let tool_name = tool.name().to_string();
            if map.contains_key(&tool_name) {
                return Err(ToolError::Duplicate(tool_name));
            }
            order.push(tool_name.clone());
            map.insert(tool_name, tool);
        }

        let name = name.into();
        info!(toolkit = %name, tools = ?order, "toolkit ready");

        let set = Arc::new(ToolSet { tools: map, order });
        let function = Function::builder(name)
            .kind(FunctionKind::Toolkit)
            .config(config)
            .input_validator(SchemaValidator::new(json!({
                "type": "object",
                "properties": {
                    "tool_calls": {
                        "type": "array",
                        "items": {"type": "object", "required": ["name"]}
                    }
                },
                "required": ["tool_calls"]
            })))
            .output_validator(SchemaValidator::new(json!({
                "type": "object",
                "required": ["tool_results", "tool_calls"]
            })))
            .build(ToolkitRunnable { set: set.clone() });

        Ok(Self { set, function })
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.set.tools.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.set.order.clone()
    }

    pub fn len(&self) -> usize {
        self.set.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.order.is_empty()
    }

    /// Tool specifications in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.set
            .order
            .iter()
            .filter_map(|name| self.set.tools.get(name))
            .map(|tool| tool.definition().clone())
            .collect()
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub async fn call(
        &self,
        ctx: &TraceContext,
        requests: Vec<ToolCallRequest>,
    ) -> Result<FunctionResult> {
        self.function
            .call(ctx, json!({ "tool_calls": requests }))
            .await
    }

    /// Dispatches a batch and returns the results, turning a reported failure
    /// back into an error.
    pub async fn dispatch(
        &self,
        ctx: &TraceContext,
        requests: Vec<ToolCallRequest>,
    ) -> Result<ToolkitOutput> {
        let output = self.call(ctx, requests).await?.into_output()?;
        ToolkitOutput::from_value(output)
    }
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit")
            .field("name", &self.name())
            .field("tools", &self.set.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_core::ErrorKind;
    use agentry_function::InMemoryTracer;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn delayed(name: &'static str, ms: u64) -> Tool {
        Tool::from_async_fn(name, "Sleeps then answers", json!({"type": "object"}), move |_| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!(format!("result_{}", name)))
        })
    }

    fn toolkit() -> Toolkit {
        Toolkit::new("toolkit", vec![delayed("A", 80), delayed("B", 10), delayed("C", 40)]).unwrap()
    }

    #[tokio::test]
    async fn test_results_keep_request_order() {
        let kit = toolkit();
        let requests = vec![
            ToolCallRequest::new("A", json!({})),
            ToolCallRequest::new("B", json!({})),
            ToolCallRequest::new("C", json!({})),
        ];

        let started = std::time::Instant::now();
        let output = kit.dispatch(&TraceContext::noop(), requests.clone()).await.unwrap();
        let contents: Vec<&str> = output.tool_results.iter().map(|m| m.content.as_str()).collect();

        assert_eq!(contents, vec!["result_A", "result_B", "result_C"]);
        assert_eq!(output.tool_calls, requests);
        // sequential dispatch would take 130ms
        assert!(started.elapsed() < Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_explicitly() {
        let kit = toolkit();
        let result = kit
            .call(&TraceContext::noop(), vec![ToolCallRequest::new("Z", json!({}))])
            .await
            .unwrap();
        assert_eq!(result.kind(), Some(ErrorKind::ToolNotFound));
    }

    #[tokio::test]
    async fn test_first_failure_aborts_batch() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let slow = Tool::from_async_fn("slow", "Slow", json!({"type": "object"}), move |_| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(json!("late"))
            }
        });
        let broken = Tool::from_fn("broken", "Fails", json!({"type": "object"}), |_| {
            anyhow::bail!("boom")
        });
        let kit = Toolkit::new("toolkit", vec![slow, broken]).unwrap();

        let result = kit
            .call(
                &TraceContext::noop(),
                vec![
                    ToolCallRequest::new("slow", json!({})),
                    ToolCallRequest::new("broken", json!({})),
                ],
            )
            .await
            .unwrap();

        assert_eq!(result.kind(), Some(ErrorKind::ToolExecution));
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Toolkit::new("toolkit", vec![delayed("A", 1), delayed("A", 1)]).unwrap_err();
        assert!(matches!(err, ToolError::Duplicate(name) if name == "A"));
    }

    #[test]
    fn test_definitions_in_registration_order() {
        let kit = toolkit();
        let names: Vec<String> = kit.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(kit.definitions()[0].to_openai()["type"], "function");
    }

    #[tokio::test]
    async fn test_tool_spans_nest_under_toolkit() {
        let tracer = Arc::new(InMemoryTracer::new());
        let kit = toolkit();
        kit.dispatch(
            &TraceContext::new(tracer.clone()),
            vec![ToolCallRequest::new("B", json!({}))],
        )
        .await
        .unwrap();

        let toolkit_obs = &tracer.find("toolkit")[0].observation;
        let tool_obs = &tracer.find("B")[0].observation;
        assert_eq!(tool_obs.parent_id.as_deref(), Some(toolkit_obs.id.as_str()));
    }
}
