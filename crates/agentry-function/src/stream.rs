//! Streaming variant of the function lifecycle

use agentry_core::{AgentError, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::error;

use crate::context::TraceContext;
use crate::lifecycle::{Execution, ExecutionRecord, Lifecycle, Resolution};
use crate::result::FunctionResult;
use crate::runnable::{FunctionKind, StreamingRunnable};

pub type ResultStream = BoxStream<'static, Result<FunctionResult>>;

/// A function whose run step yields chunks.
///
/// Every chunk is forwarded as `Success` as soon as it arrives. Once the
/// upstream is exhausted the last chunk goes through output validation,
/// post-processing and evaluation, and the call completes. A failure is
/// reported as a final item. Dropping the returned stream drops the upstream
/// with it and leaves the observation unclosed.
#[derive(Clone)]
pub struct StreamingFunction {
    lifecycle: Arc<Lifecycle>,
    runnable: Arc<dyn StreamingRunnable>,
}

impl StreamingFunction {
    pub(crate) fn new(lifecycle: Arc<Lifecycle>, runnable: Arc<dyn StreamingRunnable>) -> Self {
        Self {
            lifecycle,
            runnable,
        }
    }

    pub fn id(&self) -> &str {
        &self.lifecycle.id
    }

    pub fn name(&self) -> &str {
        &self.lifecycle.name
    }

    pub fn kind(&self) -> FunctionKind {
        self.lifecycle.kind
    }

    pub fn last_run(&self) -> Option<ExecutionRecord> {
        self.lifecycle.last_run.read().clone()
    }

    pub fn call_stream(&self, ctx: &TraceContext, input: Value) -> ResultStream {
        let lifecycle = self.lifecycle.clone();
        let runnable = self.runnable.clone();
        let ctx = ctx.clone();

        Box::pin(async_stream::stream! {
            let mut attempt = 1u32;
            loop {
                let mut execution = Execution::begin(lifecycle.clone(), &ctx, &input, attempt);
                let mut forwarded = false;

                let failure: Option<AgentError> = 'call: {
                    let validated = match execution.validate_input(input.clone()) {
                        Ok(v) => v,
                        Err(e) => break 'call Some(e),
                    };
                    if let Err(e) = execution.enter_running() {
                        break 'call Some(e);
                    }
                    let mut upstream = match runnable.run_stream(execution.context(), validated).await {
                        Ok(s) => s,
                        Err(e) => break 'call Some(e),
                    };

                    let mut last = None;
                    while let Some(item) = upstream.next().await {
                        match item {
                            Ok(chunk) => {
                                last = Some(chunk.clone());
                                forwarded = true;
                                yield Ok(FunctionResult::success(chunk));
                            }
                            Err(e) => break 'call Some(e),
                        }
                    }
                    drop(upstream);

                    let Some(last) = last else {
                        break 'call Some(AgentError::InvalidOutput(format!(
                            "[{}] stream ended without output",
                            lifecycle.name
                        )));
                    };

                    let usage = runnable.usage(&last);
                    let output = match execution.validate_output(last, usage) {
                        Ok(v) => v,
                        Err(e) => break 'call Some(e),
                    };
                    if let Err(e) = execution.evaluate_run(&output).await {
                        break 'call Some(e);
                    }
                    if let Err(e) = execution.enter_processing() {
                        break 'call Some(e);
                    }
                    let processed = match runnable.process_output(execution.context(), output).await {
                        Ok(v) => v,
                        Err(e) => break 'call Some(e),
                    };
                    let processed = match execution.validate_processed(processed) {
                        Ok(v) => v,
                        Err(e) => break 'call Some(e),
                    };
                    if let Err(e) = execution.evaluate_processed(&processed).await {
                        break 'call Some(e);
                    }
                    execution.complete(processed).await.err()
                };

                let Some(err) = failure else {
                    return;
                };
                execution.fail(&err).await;

                match lifecycle.resolve(err, attempt, !forwarded) {
                    Resolution::Finished(result) => {
                        yield Ok(result);
                        return;
                    }
                    Resolution::Propagate(err) => {
                        error!("[{}] {}", lifecycle.name, err);
                        yield Err(err);
                        return;
                    }
                    Resolution::Retry(delay) => {
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        })
    }
}

impl fmt::Debug for StreamingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingFunction")
            .field("id", &self.lifecycle.id)
            .field("name", &self.lifecycle.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;
    use crate::runnable::ValueStream;
    use crate::tracers::InMemoryTracer;
    use agentry_core::{ErrorKind, ExecutionState, ObservationStatus};
    use agentry_state::SUCCESS_PATH;
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        words: Vec<&'static str>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl StreamingRunnable for Counting {
        async fn run_stream(&self, _ctx: &TraceContext, _input: Value) -> Result<ValueStream> {
            let fail_after = self.fail_after;
            let items: Vec<Result<Value>> = self
                .words
                .iter()
                .enumerate()
                .map(|(i, w)| match fail_after {
                    Some(n) if i >= n => Err(AgentError::Other("upstream closed".into())),
                    _ => Ok(json!({"delta": w, "index": i})),
                })
                .collect();
            Ok(stream::iter(items).boxed())
        }

        async fn process_output(&self, _ctx: &TraceContext, output: Value) -> Result<Value> {
            Ok(json!({"last": output}))
        }
    }

    #[tokio::test]
    async fn test_chunks_pass_through_and_complete() {
        let tracer = Arc::new(InMemoryTracer::new());
        let ctx = TraceContext::new(tracer.clone());
        let f = Function::builder("words").build_streaming(Counting {
            words: vec!["a", "b", "c"],
            fail_after: None,
        });

        let items: Vec<FunctionResult> = f
            .call_stream(&ctx, json!({}))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[2].output().unwrap()["delta"], "c");

        let record = f.last_run().unwrap();
        assert_eq!(record.states(), SUCCESS_PATH.to_vec());
        assert_eq!(record.processed_output.unwrap()["last"]["index"], 2);
        assert_eq!(tracer.observations()[0].status, Some(ObservationStatus::Success));
    }

    #[tokio::test]
    async fn test_upstream_error_is_final_item() {
        let f = Function::builder("words").build_streaming(Counting {
            words: vec!["a", "b", "c"],
            fail_after: Some(1),
        });

        let items: Vec<FunctionResult> = f
            .call_stream(&TraceContext::noop(), json!({}))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_success());
        assert_eq!(items[1].kind(), Some(ErrorKind::Other));
        assert_eq!(f.last_run().unwrap().final_state(), ExecutionState::Failed);
    }

    struct Tracked {
        open: Arc<AtomicUsize>,
    }

    struct Guard(Arc<AtomicUsize>);

    impl Drop for Guard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StreamingRunnable for Tracked {
        async fn run_stream(&self, _ctx: &TraceContext, _input: Value) -> Result<ValueStream> {
            self.open.fetch_add(1, Ordering::SeqCst);
            let guard = Guard(self.open.clone());
            Ok(async_stream::stream! {
                let _guard = guard;
                for i in 0..100 {
                    yield Ok::<Value, AgentError>(json!({"i": i}));
                }
            }
            .boxed())
        }
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_upstream() {
        let tracer = Arc::new(InMemoryTracer::new());
        let ctx = TraceContext::new(tracer.clone());
        let open = Arc::new(AtomicUsize::new(0));
        let f = Function::builder("tracked").build_streaming(Tracked { open: open.clone() });

        let mut s = f.call_stream(&ctx, json!({}));
        let first = s.next().await.unwrap().unwrap();
        assert_eq!(first.output().unwrap()["i"], 0);
        assert_eq!(open.load(Ordering::SeqCst), 1);

        drop(s);
        assert_eq!(open.load(Ordering::SeqCst), 0);
        assert!(f.last_run().is_none());
        assert_eq!(tracer.open_count(), 1);
    }
}
