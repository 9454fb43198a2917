//! LLM configuration types

use agentry_prompt::CallOptions;
use serde::{Deserialize, Serialize};

/// Per-request model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Falls back to the catalog's default model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Expected completion size relative to the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_multiplier: Option<f64>,
}

fn default_temperature() -> f32 {
    0.0
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: default_temperature(),
            completion_multiplier: None,
        }
    }
}

impl LLMConfig {
    pub fn call_options(&self) -> CallOptions {
        CallOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            completion_multiplier: self.completion_multiplier,
            tools: Vec::new(),
        }
    }
}
