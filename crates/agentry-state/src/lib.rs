//! Execution lifecycle state machine for Agentry functions

mod machine;
mod transitions;

pub use agentry_core::ExecutionState;
pub use machine::{ExecutionStateMachine, ExecutionTransition, StateMachineSnapshot};
pub use transitions::{SUCCESS_PATH, allowed_transitions, is_allowed};
