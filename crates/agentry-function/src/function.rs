//! The execution wrapper every unit of work goes through

use agentry_core::{ErrorKind, ExecutionState, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::config::FunctionConfig;
use crate::context::TraceContext;
use crate::evaluator::Evaluator;
use crate::fallback::{FallbackStrategies, FallbackStrategy};
use crate::lifecycle::{Execution, ExecutionRecord, Lifecycle, Resolution};
use crate::result::FunctionResult;
use crate::runnable::{FunctionKind, Runnable, StreamingRunnable};
use crate::stream::StreamingFunction;
use crate::validator::{AnyObject, Validator};

pub struct FunctionBuilder {
    name: String,
    kind: FunctionKind,
    input_validator: Arc<dyn Validator>,
    output_validator: Arc<dyn Validator>,
    processed_output_validator: Arc<dyn Validator>,
    run_evaluators: Vec<Arc<dyn Evaluator>>,
    processed_output_evaluators: Vec<Arc<dyn Evaluator>>,
    fallback: FallbackStrategies,
    config: FunctionConfig,
}

impl FunctionBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            kind: FunctionKind::Generic,
            input_validator: Arc::new(AnyObject),
            output_validator: Arc::new(AnyObject),
            processed_output_validator: Arc::new(AnyObject),
            run_evaluators: Vec::new(),
            processed_output_evaluators: Vec::new(),
            fallback: FallbackStrategies::new(),
            config: FunctionConfig::default(),
        }
    }

    pub fn kind(mut self, kind: FunctionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn input_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.input_validator = Arc::new(validator);
        self
    }

    pub fn output_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.output_validator = Arc::new(validator);
        self
    }

    pub fn processed_output_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.processed_output_validator = Arc::new(validator);
        self
    }

    pub fn run_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.run_evaluators.push(Arc::new(evaluator));
        self
    }

    /// Scores of these evaluators are reported with a `proc:` prefix.
    pub fn processed_output_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.processed_output_evaluators.push(Arc::new(evaluator));
        self
    }

    pub fn fallback(mut self, kind: ErrorKind, strategy: FallbackStrategy) -> Self {
        self.fallback.insert(kind, strategy);
        self
    }

    pub fn fallbacks(mut self, fallback: FallbackStrategies) -> Self {
        self.fallback = fallback.recoverable();
        self
    }

    pub fn config(mut self, config: FunctionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    fn lifecycle(self) -> Arc<Lifecycle> {
        Arc::new(Lifecycle {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            kind: self.kind,
            input_validator: self.input_validator,
            output_validator: self.output_validator,
            processed_output_validator: self.processed_output_validator,
            run_evaluators: self.run_evaluators,
            processed_output_evaluators: self.processed_output_evaluators,
            fallback: self.fallback,
            config: self.config,
            last_run: RwLock::new(None),
        })
    }

    pub fn build(self, runnable: impl Runnable + 'static) -> Function {
        Function {
            lifecycle: self.lifecycle(),
            runnable: Arc::new(runnable),
        }
    }

    pub fn build_streaming(self, runnable: impl StreamingRunnable + 'static) -> StreamingFunction {
        StreamingFunction::new(self.lifecycle(), Arc::new(runnable))
    }
}

/// A runnable wrapped with validation, evaluation, fallback and tracing.
///
/// Each call drives its own state machine through
/// `INIT → INPUT_VALIDATION → RUNNING → OUTPUT_VALIDATION → PROCESSING_OUTPUT →
/// PROCESSED_OUTPUT_VALIDATION → COMPLETE`, or to `FAILED` from any of them,
/// so one instance can serve concurrent calls.
#[derive(Clone)]
pub struct Function {
    lifecycle: Arc<Lifecycle>,
    runnable: Arc<dyn Runnable>,
}

impl Function {
    pub fn builder(name: impl Into<String>) -> FunctionBuilder {
        FunctionBuilder::new(name.into())
    }

    pub fn new(name: impl Into<String>, runnable: impl Runnable + 'static) -> Self {
        Self::builder(name).build(runnable)
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

    pub fn config(&self) -> &FunctionConfig {
        &self.lifecycle.config
    }

    pub fn input_schema(&self) -> Option<Value> {
        self.lifecycle.input_validator.schema()
    }

    pub fn last_run(&self) -> Option<ExecutionRecord> {
        self.lifecycle.last_run.read().clone()
    }

    /// Runs the full lifecycle. Failures come back as
    /// [`FunctionResult::Error`] unless debug mode is on or no fallback
    /// strategy covers them and `propagate_unhandled` is set.
    #[instrument(skip(self, ctx, input), fields(function = %self.lifecycle.name))]
    pub async fn call(&self, ctx: &TraceContext, input: Value) -> Result<FunctionResult> {
        let mut attempt = 1;
        loop {
            match self.attempt(ctx, input.clone(), attempt).await {
                Ok(output) => return Ok(FunctionResult::success(output)),
                Err(err) => match self.lifecycle.resolve(err, attempt, true) {
                    Resolution::Finished(result) => return Ok(result),
                    Resolution::Propagate(err) => {
                        error!("[{}] {}", self.lifecycle.name, err);
                        return Err(err);
                    }
                    Resolution::Retry(delay) => {
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                },
            }
        }
    }

    async fn attempt(&self, ctx: &TraceContext, input: Value, attempt: u32) -> Result<Value> {
        let mut execution = Execution::begin(self.lifecycle.clone(), ctx, &input, attempt);
        let outcome = match self.stages(&mut execution, input).await {
            Ok(processed) => execution.complete(processed).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &outcome {
            execution.fail(err).await;
        }
        outcome
    }

    async fn stages(&self, execution: &mut Execution, input: Value) -> Result<Value> {
        let input = execution.validate_input(input)?;

        execution.enter_running()?;
        let output = self.runnable.run(execution.context(), input).await?;

        let usage = self.runnable.usage(&output);
        let output = execution.validate_output(output, usage)?;
        execution.evaluate_run(&output).await?;

        execution.enter_processing()?;
        let processed = self
            .runnable
            .process_output(execution.context(), output)
            .await?;

        let processed = execution.validate_processed(processed)?;
        execution.evaluate_processed(&processed).await?;
        Ok(processed)
    }

    /// Final state of the last call, if any.
    pub fn last_state(&self) -> Option<ExecutionState> {
        self.last_run().map(|r| r.final_state())
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("id", &self.lifecycle.id)
            .field("name", &self.lifecycle.name)
            .field("kind", &self.lifecycle.kind)
            .finish()
    }
}
