//! Few-shot example assembly

use std::sync::Arc;

use agentry_core::{ChatMessage, Example, ExampleSelector, Result};
use tracing::debug;

fn default_k() -> usize {
    3
}

/// Constant examples plus an optional relevance selector.
#[derive(Clone)]
pub struct ExampleManager {
    constant: Vec<Example>,
    selector: Option<Arc<dyn ExampleSelector>>,
    k: usize,
}

impl Default for ExampleManager {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ExampleManager {
    pub fn new(constant: Vec<Example>) -> Self {
        Self {
            constant,
            selector: None,
            k: default_k(),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn ExampleSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn constant(&self) -> &[Example] {
        &self.constant
    }

    pub fn has_selector(&self) -> bool {
        self.selector.is_some()
    }

    /// Example pairs for `query`. Selected examples are consulted only when
    /// `include_selected` is set, i.e. when the new turn comes from the user.
    pub async fn messages(&self, query: &str, include_selected: bool) -> Result<Vec<ChatMessage>> {
        let mut messages = to_messages(&self.constant);

        if let (true, Some(selector)) = (include_selected, &self.selector) {
            let selected = selector.select(query, self.k).await?;
            debug!(count = selected.len(), k = self.k, "selected examples");
            messages.extend(to_messages(&selected));
        }

        Ok(messages)
    }
}

fn to_messages(examples: &[Example]) -> Vec<ChatMessage> {
    examples
        .iter()
        .flat_map(|ex| {
            [
                ChatMessage::user(ex.user.clone()),
                ChatMessage::assistant(ex.assistant.clone()),
            ]
        })
        .collect()
}

impl std::fmt::Debug for ExampleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExampleManager")
            .field("constant", &self.constant.len())
            .field("selector", &self.selector.is_some())
            .field("k", &self.k)
            .finish()
    }
}
