use serde::{Deserialize, Serialize};

/// Per-function behavior switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    /// Re-raise every failure instead of reporting it.
    #[serde(default)]
    pub debug: bool,

    /// Evaluator failures fail the call instead of being logged.
    #[serde(default)]
    pub strict_evaluators: bool,

    /// Failures whose kind has no fallback strategy are re-raised.
    #[serde(default)]
    pub propagate_unhandled: bool,
}

impl FunctionConfig {
    pub fn debug() -> Self {
        Self {
            debug: true,
            ..Self::default()
        }
    }
}
