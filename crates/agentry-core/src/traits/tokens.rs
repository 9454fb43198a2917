use crate::message::ChatMessage;

/// Counts the prompt tokens of an assembled message sequence.
pub trait TokenCounter: Send + Sync {
    fn count(&self, messages: &[ChatMessage]) -> u32;
}
