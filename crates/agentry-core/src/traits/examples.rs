use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A user/assistant pair shown to the model as a worked example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub user: String,
    pub assistant: String,
}

impl Example {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Ranks stored examples by relevance to a query.
#[async_trait]
pub trait ExampleSelector: Send + Sync {
    async fn select(&self, query: &str, k: usize) -> Result<Vec<Example>>;
}
