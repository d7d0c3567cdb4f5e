//! Summarizer (C8): renders the conversation so far into a plain-text
//! transcript and asks the model for a narrative-paragraph summary, used by
//! the context manager's second compaction step.
use crate::client::Client;
use crate::error::EngineError;
use crate::message::{Block, Message, Role};
use crate::tools::ToolDefinition;

const MAX_TOOL_RESULT_CHARS: usize = 500;
const MAX_TOOL_INPUT_CHARS: usize = 200;

const SUMMARY_SYSTEM_PROMPT: &str = "You are compacting a coding-agent conversation to free up context space. \
Write a concise narrative paragraph (not a list) covering: what the user asked for, what has been tried, \
what succeeded or failed, and what remains to be done. Be specific about file paths and decisions made. \
Do not invent details not present in the transcript.";

/// Render a message list the way a human reviewing the session log would
/// read it: `[Tool: name]` before a call, `[Tool Result]` / `[Tool Result
/// (ERROR)]` before its output, long tool output capped.
fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let text = message.text();
        if !text.is_empty() {
            let speaker = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            out.push_str(&format!("{speaker}: {text}\n"));
        }
        for block in &message.content {
            match block {
                Block::ToolUse { name, input, .. } => {
                    let rendered = input.to_string();
                    let truncated = if rendered.len() > MAX_TOOL_INPUT_CHARS {
                        let kept: String = rendered.chars().take(MAX_TOOL_INPUT_CHARS).collect();
                        format!("{kept}... [truncated]")
                    } else {
                        rendered
                    };
                    out.push_str(&format!("[Tool: {name}] {truncated}\n"));
                }
                Block::ToolResult { content, is_error, .. } => {
                    let label = if *is_error { "[Tool Result (ERROR)]" } else { "[Tool Result]" };
                    let joined = content.join("\n");
                    let truncated = if joined.len() > MAX_TOOL_RESULT_CHARS {
                        let kept: String = joined.chars().take(MAX_TOOL_RESULT_CHARS).collect();
                        format!("{kept}... [truncated]")
                    } else {
                        joined
                    };
                    out.push_str(&format!("{label} {truncated}\n"));
                }
                Block::Text { .. } => {}
            }
        }
    }
    out
}

pub async fn summarize(client: &Client, messages: &[Message]) -> Result<String, EngineError> {
    let transcript = render_transcript(messages);
    let prompt = Message::user_text(format!(
        "Here is the conversation transcript to summarize:\n\n{transcript}"
    ));
    let no_tools: Vec<ToolDefinition> = Vec::new();
    let response = client.chat(SUMMARY_SYSTEM_PROMPT, &[prompt], &no_tools, |_| {}).await?;
    let summary = response
        .content
        .iter()
        .filter_map(|b| match b {
            Block::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");
    if summary.trim().is_empty() {
        return Err(EngineError::Remote("summarizer returned empty text".to_string()));
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_transcript_labels_tool_blocks() {
        let messages = vec![
            Message::user_text("fix the bug"),
            Message::assistant(vec![Block::ToolUse { id: "1".into(), name: "bash".into(), input: serde_json::json!({"command": "cargo test"}) }]),
            Message::user(vec![Block::tool_result("1", "test failed", true)]),
        ];
        let rendered = render_transcript(&messages);
        assert!(rendered.contains("User: fix the bug"));
        assert!(rendered.contains("[Tool: bash]"));
        assert!(rendered.contains("[Tool Result (ERROR)] test failed"));
    }

    #[test]
    fn render_transcript_truncates_long_results() {
        let messages = vec![Message::user(vec![Block::tool_result("1", "x".repeat(1000), false)])];
        let rendered = render_transcript(&messages);
        assert!(rendered.contains("[truncated]"));
    }

    #[test]
    fn render_transcript_truncates_long_tool_inputs() {
        let big_path = "a".repeat(1000);
        let messages = vec![Message::assistant(vec![Block::ToolUse {
            id: "1".into(),
            name: "read".into(),
            input: serde_json::json!({ "path": big_path }),
        }])];
        let rendered = render_transcript(&messages);
        assert!(rendered.contains("[Tool: read]"));
        assert!(rendered.contains("[truncated]"));
    }
}
