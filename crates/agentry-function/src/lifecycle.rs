//! Stages of one function call, shared by blocking and streaming functions

use agentry_core::{
    AgentError, ExecutionState, Observation, ObservationStatus, Result, TokenUsage,
};
use agentry_state::{ExecutionStateMachine, StateMachineSnapshot};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::FunctionConfig;
use crate::context::TraceContext;
use crate::evaluator::Evaluator;
use crate::fallback::{FallbackStrategies, FallbackStrategy, retry_delay};
use crate::result::FunctionResult;
use crate::runnable::FunctionKind;
use crate::validator::Validator;

const PROCESSED_SCORE_PREFIX: &str = "proc:";

/// What happened during the last call of a function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub function_id: String,
    pub function: String,
    pub attempt: u32,
    pub observation_id: String,
    pub trace_id: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: StateMachineSnapshot,
}

impl ExecutionRecord {
    pub fn states(&self) -> Vec<ExecutionState> {
        self.state.states()
    }

    pub fn final_state(&self) -> ExecutionState {
        self.state.current_state
    }
}

pub(crate) struct Lifecycle {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) kind: FunctionKind,
    pub(crate) input_validator: Arc<dyn Validator>,
    pub(crate) output_validator: Arc<dyn Validator>,
    pub(crate) processed_output_validator: Arc<dyn Validator>,
    pub(crate) run_evaluators: Vec<Arc<dyn Evaluator>>,
    pub(crate) processed_output_evaluators: Vec<Arc<dyn Evaluator>>,
    pub(crate) fallback: FallbackStrategies,
    pub(crate) config: FunctionConfig,
    pub(crate) last_run: RwLock<Option<ExecutionRecord>>,
}

pub(crate) enum Resolution {
    Finished(FunctionResult),
    Retry(Duration),
    Propagate(AgentError),
}

impl Lifecycle {
    /// Decides what a failed attempt turns into.
    pub(crate) fn resolve(&self, err: AgentError, attempt: u32, can_retry: bool) -> Resolution {
        if self.config.debug {
            return Resolution::Propagate(err);
        }
        if err.is_contract_violation() {
            return if self.config.propagate_unhandled {
                Resolution::Propagate(err)
            } else {
                Resolution::Finished(FunctionResult::error(&err))
            };
        }

        match self.fallback.get(err.kind()) {
            Some(FallbackStrategy::Report) => Resolution::Finished(FunctionResult::error(&err)),
            Some(FallbackStrategy::Default { value }) => {
                info!("[{}] using default output after: {}", self.name, err);
                Resolution::Finished(FunctionResult::success(value.clone()))
            }
            Some(FallbackStrategy::Retry {
                max_attempts,
                backoff_ms,
            }) if can_retry && attempt < *max_attempts => {
                let delay = retry_delay(*backoff_ms, attempt);
                warn!(
                    "[{}] attempt {}/{} failed, retrying in {:?}: {}",
                    self.name, attempt, max_attempts, delay, err
                );
                Resolution::Retry(delay)
            }
            Some(FallbackStrategy::Retry { .. }) => {
                Resolution::Finished(FunctionResult::error(&err))
            }
            None if self.config.propagate_unhandled => Resolution::Propagate(err),
            None => Resolution::Finished(FunctionResult::error(&err)),
        }
    }
}

/// One in-flight call: its own state machine, observation and trace context.
pub(crate) struct Execution {
    lifecycle: Arc<Lifecycle>,
    machine: ExecutionStateMachine,
    observation: Observation,
    ctx: TraceContext,
    attempt: u32,
    input: Value,
    output: Option<Value>,
    processed_output: Option<Value>,
    usage: Option<TokenUsage>,
    run_evaluated: bool,
    processed_evaluated: bool,
}

impl Execution {
    pub(crate) fn begin(
        lifecycle: Arc<Lifecycle>,
        parent: &TraceContext,
        input: &Value,
        attempt: u32,
    ) -> Self {
        let observation = parent.open(lifecycle.kind.observation_kind(), &lifecycle.name, input);
        let ctx = parent.child(observation.clone());
        let machine = ExecutionStateMachine::new(lifecycle.name.clone(), lifecycle.id.clone());
        debug!(
            "[{}|{}] call started (attempt {})",
            lifecycle.name, observation.id, attempt
        );

        Self {
            lifecycle,
            machine,
            observation,
            ctx,
            attempt,
            input: input.clone(),
            output: None,
            processed_output: None,
            usage: None,
            run_evaluated: false,
            processed_evaluated: false,
        }
    }

    /// Context handed to the run step; its current observation is this call's.
    pub(crate) fn context(&self) -> &TraceContext {
        &self.ctx
    }

    pub(crate) fn validate_input(&mut self, input: Value) -> Result<Value> {
        self.machine.transition(ExecutionState::InputValidation)?;
        self.lifecycle
            .input_validator
            .validate(input)
            .map_err(|e| AgentError::InvalidInput(format!("[{}] {}", self.lifecycle.name, e)))
    }

    pub(crate) fn enter_running(&self) -> Result<()> {
        self.machine.transition(ExecutionState::Running)
    }

    pub(crate) fn validate_output(
        &mut self,
        output: Value,
        usage: Option<TokenUsage>,
    ) -> Result<Value> {
        self.machine.transition(ExecutionState::OutputValidation)?;
        self.usage = usage;
        self.output = Some(output.clone());
        self.lifecycle
            .output_validator
            .validate(output)
            .map_err(|e| AgentError::InvalidOutput(format!("[{}] {}", self.lifecycle.name, e)))
    }

    pub(crate) async fn evaluate_run(&mut self, output: &Value) -> Result<()> {
        self.run_evaluated = true;
        let lifecycle = self.lifecycle.clone();
        let result = FunctionResult::success(output.clone());
        self.score(
            &lifecycle.run_evaluators,
            &result,
            "",
            lifecycle.config.strict_evaluators,
        )
        .await
    }

    pub(crate) fn enter_processing(&self) -> Result<()> {
        self.machine.transition(ExecutionState::ProcessingOutput)
    }

    pub(crate) fn validate_processed(&mut self, processed: Value) -> Result<Value> {
        self.machine
            .transition(ExecutionState::ProcessedOutputValidation)?;
        self.processed_output = Some(processed.clone());
        self.lifecycle
            .processed_output_validator
            .validate(processed)
            .map_err(|e| AgentError::InvalidOutput(format!("[{}] {}", self.lifecycle.name, e)))
    }

    pub(crate) async fn evaluate_processed(&mut self, processed: &Value) -> Result<()> {
        self.processed_evaluated = true;
        let lifecycle = self.lifecycle.clone();
        let result = FunctionResult::success(processed.clone());
        self.score(
            &lifecycle.processed_output_evaluators,
            &result,
            PROCESSED_SCORE_PREFIX,
            lifecycle.config.strict_evaluators,
        )
        .await
    }

    /// Moves to COMPLETE and closes the observation with success.
    pub(crate) async fn complete(&mut self, processed: Value) -> Result<Value> {
        self.machine.transition(ExecutionState::Complete)?;

        let tracer = self.ctx.tracer().clone();
        tracer.close(
            &self.observation,
            &processed,
            ObservationStatus::Success,
            self.usage,
        );
        tracer.flush().await;

        self.processed_output = Some(processed.clone());
        self.store(None);
        Ok(processed)
    }

    /// Moves to FAILED, closes the observation with error status and feeds the
    /// error to every evaluator that has not run yet.
    pub(crate) async fn fail(&mut self, err: &AgentError) {
        let message = err.to_string();
        if let Err(transition_err) = self
            .machine
            .transition_with_reason(ExecutionState::Failed, Some(&message))
        {
            warn!("[{}] {}", self.lifecycle.name, transition_err);
        }

        let tracer = self.ctx.tracer().clone();
        tracer.close(
            &self.observation,
            &json!({ "error": message, "kind": err.kind() }),
            ObservationStatus::Error,
            self.usage,
        );
        tracer.flush().await;

        let lifecycle = self.lifecycle.clone();
        let result = FunctionResult::error(err);
        if !self.run_evaluated {
            self.run_evaluated = true;
            let _ = self
                .score(&lifecycle.run_evaluators, &result, "", false)
                .await;
        }
        if !self.processed_evaluated {
            self.processed_evaluated = true;
            let _ = self
                .score(
                    &lifecycle.processed_output_evaluators,
                    &result,
                    PROCESSED_SCORE_PREFIX,
                    false,
                )
                .await;
        }

        self.store(Some(message));
    }

    async fn score(
        &self,
        evaluators: &[Arc<dyn Evaluator>],
        result: &FunctionResult,
        prefix: &str,
        strict: bool,
    ) -> Result<()> {
        for evaluator in evaluators {
            match evaluator.evaluate(&self.ctx, result).await {
                Ok(evaluation) => {
                    for (name, value) in &evaluation.scores {
                        self.ctx.tracer().score(
                            &self.observation,
                            &format!("{}{}", prefix, name),
                            *value,
                            evaluation.comment.as_deref(),
                        );
                    }
                }
                Err(err) if strict => return Err(err),
                Err(err) => warn!(
                    "[{}] evaluator {} failed: {}",
                    self.lifecycle.name,
                    evaluator.name(),
                    err
                ),
            }
        }
        Ok(())
    }

    fn store(&self, error: Option<String>) {
        let record = ExecutionRecord {
            function_id: self.lifecycle.id.clone(),
            function: self.lifecycle.name.clone(),
            attempt: self.attempt,
            observation_id: self.observation.id.clone(),
            trace_id: self.observation.trace_id.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            processed_output: self.processed_output.clone(),
            error,
            state: self.machine.snapshot(),
        };
        *self.lifecycle.last_run.write() = Some(record);
    }
}
