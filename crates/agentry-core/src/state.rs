//! Lifecycle states shared by every executable unit

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Init,
    InputValidation,
    Running,
    OutputValidation,
    ProcessingOutput,
    ProcessedOutputValidation,
    Complete,
    Failed,
}

impl ExecutionState {
    pub const ALL: [ExecutionState; 8] = [
        ExecutionState::Init,
        ExecutionState::InputValidation,
        ExecutionState::Running,
        ExecutionState::OutputValidation,
        ExecutionState::ProcessingOutput,
        ExecutionState::ProcessedOutputValidation,
        ExecutionState::Complete,
        ExecutionState::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Complete | ExecutionState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Init => "INIT",
            ExecutionState::InputValidation => "INPUT_VALIDATION",
            ExecutionState::Running => "RUNNING",
            ExecutionState::OutputValidation => "OUTPUT_VALIDATION",
            ExecutionState::ProcessingOutput => "PROCESSING_OUTPUT",
            ExecutionState::ProcessedOutputValidation => "PROCESSED_OUTPUT_VALIDATION",
            ExecutionState::Complete => "COMPLETE",
            ExecutionState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
