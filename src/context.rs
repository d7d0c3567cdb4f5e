//! Context manager (C4): three-step compaction — tool-result truncation,
//! then model-driven summarization, then simple truncation as a last
//! resort — always operating on whole `(ToolUse, ToolResult)` pairs so the
//! pairing invariant never breaks, even on the fallback path.
use std::future::Future;

use crate::error::EngineError;
use crate::message::{Block, Message};
use crate::tokens::{estimate_messages, ContextLimits};

/// How many of the most recent tool results to leave untouched when
/// truncating tool output (older results are replaced with a one-line
/// stand-in; newer ones may still be relevant to the model's next step).
const KEEP_RECENT_TOOL_RESULTS: usize = 3;

/// Tool-result text kept (from the start) before the truncation sentinel is
/// appended.
const TRUNCATED_RESULT_KEEP_CHARS: usize = 500;

const TRUNCATION_SENTINEL: &str = "[... output truncated for context management ...]";

const SUMMARY_HEADER: &str = "[CONVERSATION SUMMARY - Earlier messages have been condensed]";
const SUMMARY_FOOTER: &str = "[END SUMMARY - Recent conversation continues below]";

/// Whether `text` is a compaction summary message produced by [`compact`].
pub fn is_summary_message(text: &str) -> bool {
    text.starts_with(SUMMARY_HEADER)
}

/// How many trailing atomic units (messages, or tool-use/tool-result pairs)
/// simple truncation must never drop.
const PROTECT_TAIL_UNITS: usize = 4;

/// `[start, end)` message-index span of one atomic compaction unit: either
/// a single message with no tool uses, or a `(ToolUse, ToolResult)` pair.
fn atomic_units(messages: &[Message]) -> Vec<(usize, usize)> {
    let mut units = Vec::new();
    let mut i = 0;
    while i < messages.len() {
        if !messages[i].tool_uses().is_empty() && i + 1 < messages.len() {
            units.push((i, i + 2));
            i += 2;
        } else {
            units.push((i, i + 1));
            i += 1;
        }
    }
    units
}

/// Pass 1: shrink old tool-result content in place without dropping any
/// message or block, keeping the pairing invariant trivially intact.
fn truncate_tool_results(messages: &mut [Message]) {
    let units = atomic_units(messages);
    let result_unit_indices: Vec<usize> = units
        .iter()
        .enumerate()
        .filter(|(_, (start, end))| {
            (*start..*end).any(|i| messages[i].content.iter().any(|b| matches!(b, Block::ToolResult { .. })))
        })
        .map(|(idx, _)| idx)
        .collect();

    let cutoff = result_unit_indices.len().saturating_sub(KEEP_RECENT_TOOL_RESULTS);
    for &unit_idx in &result_unit_indices[..cutoff] {
        let (start, end) = units[unit_idx];
        for message in &mut messages[start..end] {
            for block in &mut message.content {
                if let Block::ToolResult { content, .. } = block {
                    let joined = content.join("");
                    if joined.len() > TRUNCATED_RESULT_KEEP_CHARS {
                        let kept: String = joined.chars().take(TRUNCATED_RESULT_KEEP_CHARS).collect();
                        *content = vec![format!("{kept}\n{TRUNCATION_SENTINEL}")];
                    }
                }
            }
        }
    }
}

/// Pass 3: drop the oldest atomic units (never the first unit, never the
/// last `PROTECT_TAIL_UNITS`) until under the trigger threshold.
fn simple_truncate(messages: Vec<Message>, limits: &ContextLimits) -> Vec<Message> {
    let mut units = atomic_units(&messages);
    let mut kept: Vec<Message> = messages;

    while units.len() > PROTECT_TAIL_UNITS + 1 {
        if !limits.should_compact(estimate_messages(&kept)) {
            break;
        }
        // Drop the oldest droppable unit (index 1, since index 0 is protected).
        let (start, end) = units[1];
        let mut next = Vec::with_capacity(kept.len() - (end - start));
        next.extend_from_slice(&kept[..start]);
        next.extend_from_slice(&kept[end..]);
        kept = next;
        units = atomic_units(&kept);
    }

    kept
}

/// Run the three-step compaction strategy. `summarize` is given the full
/// message list and returns a narrative summary string; its failure falls
/// back to simple truncation rather than aborting the turn.
pub async fn compact<F, Fut>(mut messages: Vec<Message>, limits: &ContextLimits, summarize: F) -> Vec<Message>
where
    F: FnOnce(Vec<Message>) -> Fut,
    Fut: Future<Output = Result<String, EngineError>>,
{
    if !limits.should_compact(estimate_messages(&messages)) {
        return messages;
    }

    truncate_tool_results(&mut messages);
    if !limits.should_compact(estimate_messages(&messages)) {
        log::info!("context compacted via tool-result truncation");
        return messages;
    }

    let units = atomic_units(&messages);
    let tail_start = units.len().saturating_sub(PROTECT_TAIL_UNITS);
    let tail: Vec<Message> = units[tail_start..]
        .iter()
        .flat_map(|&(s, e)| messages[s..e].to_vec())
        .collect();

    match summarize(messages.clone()).await {
        Ok(summary) => {
            log::info!("context compacted via summarization");
            let mut out = vec![Message::user_text(format!("{SUMMARY_HEADER}\n{summary}\n{SUMMARY_FOOTER}"))];
            out.extend(tail);
            out
        }
        Err(e) => {
            log::warn!("summarization failed ({e}), falling back to simple truncation");
            simple_truncate(messages, limits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::pairing_invariant_holds;

    fn tool_pair(id: &str, result_len: usize) -> Vec<Message> {
        vec![
            Message::assistant(vec![Block::ToolUse { id: id.into(), name: "read".into(), input: serde_json::json!({}) }]),
            Message::user(vec![Block::tool_result(id, "x".repeat(result_len), false)]),
        ]
    }

    #[test]
    fn truncate_tool_results_preserves_pairing() {
        let mut messages = vec![Message::user_text("start")];
        for i in 0..10 {
            messages.extend(tool_pair(&format!("call_{i}"), 600));
        }
        truncate_tool_results(&mut messages);
        assert!(pairing_invariant_holds(&messages));
        // Oldest results should be shrunk, most recent left alone.
        let first_result = &messages[2];
        assert!(first_result.content.iter().any(|b| matches!(b, Block::ToolResult{content,..} if content[0].contains("truncated"))));
    }

    #[test]
    fn simple_truncate_preserves_pairing_and_protects_tail() {
        let mut messages = vec![Message::user_text("first")];
        for i in 0..20 {
            messages.extend(tool_pair(&format!("call_{i}"), 50));
        }
        let limits = ContextLimits { max_context: 2_000, reserved_output: 100, reserved_system: 100, threshold_frac: 0.8 };
        let total_before = messages.len();
        let out = simple_truncate(messages, &limits);
        assert!(pairing_invariant_holds(&out));
        assert!(out.len() < total_before);
        assert_eq!(out[0].text(), "first");
    }

    #[tokio::test]
    async fn compact_is_noop_under_threshold() {
        let messages = vec![Message::user_text("hi")];
        let limits = ContextLimits::default();
        let out = compact(messages.clone(), &limits, |_| async { Ok(String::new()) }).await;
        assert_eq!(out.len(), messages.len());
    }

    #[tokio::test]
    async fn compact_falls_back_to_truncation_on_summarizer_error() {
        let mut messages = vec![Message::user_text("first")];
        for i in 0..200 {
            messages.extend(tool_pair(&format!("call_{i}"), 2000));
        }
        let limits = ContextLimits { max_context: 5_000, reserved_output: 100, reserved_system: 100, threshold_frac: 0.8 };
        let out = compact(messages, &limits, |_| async { Err(EngineError::ContextExhausted) }).await;
        assert!(pairing_invariant_holds(&out));
    }
}
