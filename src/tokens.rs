//! Token estimation and context-window accounting (C1).
use crate::message::{Block, Message};

/// Crude but stable token estimator: `ceil(byte_len / 4)`. Matches the
/// corpus-wide convention of approximating tokens from byte length rather
/// than running a real tokenizer.
pub fn estimate_str(s: &str) -> usize {
    (s.len() + 3) / 4
}

/// Token cost of a single content block, including its structural overhead.
pub fn estimate_block(block: &Block) -> usize {
    match block {
        Block::Text { text } => estimate_str(text),
        Block::ToolUse { name, input, .. } => {
            estimate_str(name) + estimate_str(&input.to_string())
        }
        Block::ToolResult { content, .. } => {
            10 + content.iter().map(|s| estimate_str(s)).sum::<usize>()
        }
    }
}

/// Token cost of a message: a fixed per-message role overhead plus its blocks.
pub fn estimate_message(message: &Message) -> usize {
    2 + message.content.iter().map(estimate_block).sum::<usize>()
}

/// Token cost of an entire message list.
pub fn estimate_messages(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message).sum()
}

/// Context-window budget configuration, per spec.md §4.1.
#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    pub max_context: usize,
    pub reserved_output: usize,
    pub reserved_system: usize,
    pub threshold_frac: f64,
}

impl Default for ContextLimits {
    fn default() -> Self {
        ContextLimits {
            max_context: 200_000,
            reserved_output: 8_192,
            reserved_system: 20_000,
            threshold_frac: 0.8,
        }
    }
}

impl ContextLimits {
    /// Tokens available for conversation history after reserving output and
    /// system-prompt budgets.
    pub fn available(&self) -> usize {
        self.max_context
            .saturating_sub(self.reserved_output)
            .saturating_sub(self.reserved_system)
    }

    /// Token count above which compaction should trigger.
    pub fn trigger(&self) -> usize {
        ((self.available() as f64) * self.threshold_frac) as usize
    }

    /// Whether the given history token count has crossed the compaction
    /// trigger threshold.
    pub fn should_compact(&self, history_tokens: usize) -> bool {
        history_tokens >= self.trigger()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn estimates_scale_with_length() {
        assert_eq!(estimate_str(""), 0);
        assert_eq!(estimate_str("ab"), 1);
        assert_eq!(estimate_str("abcd"), 1);
        assert_eq!(estimate_str("abcde"), 2);
    }

    #[test]
    fn message_overhead_applies_once() {
        let m = Message { role: Role::User, content: vec![] };
        assert_eq!(estimate_message(&m), 2);
    }

    #[test]
    fn default_limits_match_spec() {
        let limits = ContextLimits::default();
        assert_eq!(limits.max_context, 200_000);
        assert_eq!(limits.available(), 200_000 - 8_192 - 20_000);
        assert_eq!(limits.trigger(), ((171_808_usize) as f64 * 0.8) as usize);
    }

    #[test]
    fn should_compact_crosses_threshold() {
        let limits = ContextLimits::default();
        assert!(!limits.should_compact(0));
        assert!(limits.should_compact(limits.trigger()));
    }
}
