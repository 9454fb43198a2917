//! Token count heuristics

use agentry_core::{ChatMessage, TokenCounter};

pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    let ascii_chars = text.chars().filter(|c| c.is_ascii()).count();
    let cjk_chars = text.chars().filter(|c| is_cjk(*c)).count();
    let other_chars = text.chars().count() - ascii_chars - cjk_chars;

    let estimated =
        (ascii_chars as f64 / 4.0) + (cjk_chars as f64 * 1.5) + (other_chars as f64 * 1.0);

    estimated.ceil().max(1.0) as u32
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{AC00}'..='\u{D7AF}' |
        '\u{3040}'..='\u{30FF}' |
        '\u{31F0}'..='\u{31FF}'
    )
}

pub fn estimate_message_tokens(message: &ChatMessage) -> u32 {
    let role_tokens = 4u32;
    let content_tokens = estimate_tokens(&message.content);
    let name_tokens = message
        .name
        .as_ref()
        .map(|n| estimate_tokens(n))
        .unwrap_or(0);
    let tool_call_tokens: u32 = message
        .tool_calls
        .iter()
        .map(|c| estimate_tokens(&c.name) + estimate_tokens(&c.arguments))
        .sum();

    role_tokens + content_tokens + name_tokens + tool_call_tokens
}

/// Character-class estimate; no tokenizer involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatingCounter;

impl TokenCounter for EstimatingCounter {
    fn count(&self, messages: &[ChatMessage]) -> u32 {
        messages.iter().map(estimate_message_tokens).sum()
    }
}
