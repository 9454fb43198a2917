//! Context-window limits and larger-context fallbacks per model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const CONTEXT_LIMITS: &[(&str, u32)] = &[
    ("gpt-3.5-turbo-1106", 16385),
    ("gpt-3.5-turbo", 4096),
    ("gpt-3.5-turbo-16k", 16385),
    ("gpt-3.5-turbo-instruct", 4096),
    ("gpt-3.5-turbo-0613", 4096),
    ("gpt-3.5-turbo-16k-0613", 16385),
    ("gpt-3.5-turbo-0301", 4096),
    ("text-davinci-003", 4096),
    ("text-davinci-002", 4096),
    ("code-davinci-002", 8001),
    ("gpt-4-1106-preview", 4096),
    ("gpt-4-vision-preview", 4096),
    ("gpt-4", 8192),
    ("gpt-4-32k", 32768),
    ("gpt-4-0613", 8192),
    ("gpt-4-32k-0613", 32768),
    ("gpt-4-0314", 8192),
    ("gpt-4-32k-0314", 32768),
];

const FALLBACKS: &[(&str, &str)] = &[
    ("gpt-3.5-turbo", "gpt-3.5-turbo-16k"),
    ("gpt-3.5-turbo-0613", "gpt-3.5-turbo-16k-0613"),
    ("gpt-4", "gpt-4-32k"),
    ("gpt-4-0613", "gpt-4-32k-0613"),
    ("gpt-4-0314", "gpt-4-32k-0314"),
];

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_context_limits() -> HashMap<String, u32> {
    CONTEXT_LIMITS
        .iter()
        .map(|(model, limit)| (model.to_string(), *limit))
        .collect()
}

fn default_fallbacks() -> HashMap<String, String> {
    FALLBACKS
        .iter()
        .map(|(model, fallback)| (model.to_string(), fallback.to_string()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalog {
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Replaces the built-in table when given.
    #[serde(default = "default_context_limits")]
    pub context_limits: HashMap<String, u32>,

    #[serde(default = "default_fallbacks")]
    pub fallbacks: HashMap<String, String>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            context_limits: default_context_limits(),
            fallbacks: default_fallbacks(),
        }
    }
}

impl ModelCatalog {
    pub fn context_limit(&self, model: &str) -> Option<u32> {
        self.context_limits.get(model).copied()
    }

    pub fn fallback_for(&self, model: &str) -> Option<&str> {
        self.fallbacks.get(model).map(String::as_str)
    }

    pub fn with_limit(mut self, model: impl Into<String>, limit: u32) -> Self {
        self.context_limits.insert(model.into(), limit);
        self
    }

    pub fn with_fallback(mut self, model: impl Into<String>, fallback: impl Into<String>) -> Self {
        self.fallbacks.insert(model.into(), fallback.into());
        self
    }
}
