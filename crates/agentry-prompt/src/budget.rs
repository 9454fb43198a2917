//! Completion budget and model selection

use agentry_llm::ModelCatalog;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetPolicy {
    #[serde(default = "default_min_completion_tokens")]
    pub min_completion_tokens: u32,

    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: u32,

    /// Swap to the fallback model when
    /// `(input + max_tokens) / (context_limit - input)` exceeds this.
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f64,

    #[serde(default = "default_completion_multiplier")]
    pub completion_multiplier: f64,
}

fn default_min_completion_tokens() -> u32 {
    500
}

fn default_max_completion_tokens() -> u32 {
    4096
}

fn default_fallback_threshold() -> f64 {
    0.9
}

fn default_completion_multiplier() -> f64 {
    1.0
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            min_completion_tokens: default_min_completion_tokens(),
            max_completion_tokens: default_max_completion_tokens(),
            fallback_threshold: default_fallback_threshold(),
            completion_multiplier: default_completion_multiplier(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub model: String,
    pub max_tokens: u32,
    pub input_tokens: u32,
    /// The requested model was replaced by its larger-context fallback.
    pub swapped: bool,
}

impl BudgetPolicy {
    /// `clamp(max(min, input * multiplier), max)`.
    pub fn max_tokens(&self, input_tokens: u32, multiplier: f64) -> u32 {
        let scaled = (input_tokens as f64 * multiplier).ceil() as u32;
        scaled
            .max(self.min_completion_tokens)
            .min(self.max_completion_tokens)
    }

    pub fn run_config(
        &self,
        catalog: &ModelCatalog,
        model: &str,
        input_tokens: u32,
        multiplier: f64,
    ) -> RunConfig {
        let max_tokens = self.max_tokens(input_tokens, multiplier);
        let mut config = RunConfig {
            model: model.to_string(),
            max_tokens,
            input_tokens,
            swapped: false,
        };

        let Some(limit) = catalog.context_limit(model) else {
            debug!(model, "no context limit known, keeping model");
            return config;
        };

        let available = limit.saturating_sub(input_tokens);
        let expected = (input_tokens + max_tokens) as f64;
        let overflows = available == 0 || expected / available as f64 > self.fallback_threshold;
        if !overflows {
            return config;
        }

        match catalog.fallback_for(model) {
            Some(fallback) => {
                debug!(
                    model,
                    fallback, input_tokens, max_tokens, limit, "switching to larger context model"
                );
                config.model = fallback.to_string();
                config.swapped = true;
            }
            None => warn!(
                model,
                input_tokens, max_tokens, limit, "prompt near context limit and no fallback model"
            ),
        }
        config
    }
}
