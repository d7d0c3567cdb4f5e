//! OpenAI-compatible streaming chat client. Operates on the engine's
//! `Message`/`Block` model at its public boundary, translating to and from
//! the provider's flat, separate-tool-role wire format internally.
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::message::{Block, Message, Role};
use crate::tools::ToolDefinition;

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    tools: Vec<WireTool>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction,
}

#[derive(Debug, Serialize)]
struct WireToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

/// Flatten the engine's message model into the provider's wire shape: tool
/// results become separate `role: "tool"` messages, mirroring how every
/// OpenAI-compatible endpoint expects them.
fn build_wire_messages(system: &str, messages: &[Message]) -> Vec<WireMessage> {
    let mut out = vec![WireMessage {
        role: "system",
        content: Some(system.to_string()),
        tool_calls: None,
        tool_call_id: None,
    }];

    for message in messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        let text = message.text();
        let tool_calls: Vec<WireToolCall> = message
            .content
            .iter()
            .filter_map(|b| match b {
                Block::ToolUse { id, name, input } => Some(WireToolCall {
                    id: id.clone(),
                    kind: "function",
                    function: WireFunctionCall { name: name.clone(), arguments: input.to_string() },
                }),
                _ => None,
            })
            .collect();

        if !text.is_empty() || !tool_calls.is_empty() {
            out.push(WireMessage {
                role,
                content: if text.is_empty() { None } else { Some(text) },
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                tool_call_id: None,
            });
        }

        for block in &message.content {
            if let Block::ToolResult { tool_use_id, content, .. } = block {
                out.push(WireMessage {
                    role: "tool",
                    content: Some(content.join("\n")),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                });
            }
        }
    }

    out
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<UsageStats>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageStats {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Text deltas observed while streaming, handed to the caller as they
/// arrive so the engine can forward them as `Chunk::Text`.
pub struct ModelResponse {
    pub content: Vec<Block>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

pub struct Client {
    http: reqwest::Client,
    endpoint: String,
    model: std::sync::Mutex<String>,
    api_key: Option<String>,
}

impl Client {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Client { http: reqwest::Client::new(), endpoint: endpoint.into(), model: std::sync::Mutex::new(model.into()), api_key }
    }

    /// Switch the model used by subsequent `chat` calls, per the `/model`
    /// slash command.
    pub fn set_model(&self, model: impl Into<String>) {
        *self.model.lock().unwrap() = model.into();
    }

    pub fn model(&self) -> String {
        self.model.lock().unwrap().clone()
    }

    /// Stream one assistant turn. `on_text` is invoked with each text delta
    /// as it arrives; the full response (text collapsed into one `Block::Text`
    /// plus any tool calls) is returned once the stream ends.
    pub async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        mut on_text: impl FnMut(&str),
    ) -> Result<ModelResponse, EngineError> {
        let request = ChatRequest {
            model: self.model(),
            messages: build_wire_messages(system, messages),
            tools: tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: WireToolFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    },
                })
                .collect(),
            stream: true,
        };

        let mut req = self.http.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| classify_request_error(&e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                EngineError::TransientRemote(format!("{status}: {body}"))
            } else {
                EngineError::Remote(format!("{status}: {body}"))
            });
        }

        let mut stream = response.bytes_stream();
        let mut leftover = String::new();
        let mut text = String::new();
        let mut reasoning = String::new();
        let mut tool_calls: Vec<PendingToolCall> = Vec::new();
        let mut input_tokens = 0;
        let mut output_tokens = 0;

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| classify_request_error(&e))?;
            leftover.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = leftover.find('\n') {
                let line = leftover[..pos].trim().to_string();
                leftover.drain(..=pos);
                if line.is_empty() || !line.starts_with("data:") {
                    continue;
                }
                let payload = line[5..].trim();
                if payload == "[DONE]" {
                    continue;
                }
                let Ok(parsed) = serde_json::from_str::<StreamChunk>(payload) else { continue };
                if let Some(usage) = parsed.usage {
                    input_tokens = usage.prompt_tokens;
                    output_tokens = usage.completion_tokens;
                }
                for choice in parsed.choices {
                    if let Some(delta_text) = choice.delta.content {
                        if !delta_text.is_empty() {
                            on_text(&delta_text);
                            text.push_str(&delta_text);
                        }
                    }
                    if let Some(r) = choice.delta.reasoning_content.or(choice.delta.reasoning) {
                        reasoning.push_str(&r);
                    }
                    if let Some(deltas) = choice.delta.tool_calls {
                        for d in deltas {
                            if tool_calls.len() <= d.index {
                                tool_calls.resize_with(d.index + 1, PendingToolCall::default);
                            }
                            let slot = &mut tool_calls[d.index];
                            if let Some(id) = d.id {
                                slot.id = id;
                            }
                            if let Some(f) = d.function {
                                if let Some(name) = f.name {
                                    slot.name.push_str(&name);
                                }
                                if let Some(args) = f.arguments {
                                    slot.arguments.push_str(&args);
                                }
                            }
                        }
                    }
                }
            }
        }

        if !reasoning.is_empty() {
            log::debug!("model reasoning ({} chars) discarded from chunk stream", reasoning.len());
        }

        let mut content = Vec::new();
        if !text.is_empty() {
            content.push(Block::text(text));
        }
        for call in tool_calls {
            let input: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
            content.push(Block::ToolUse { id: call.id, name: call.name, input });
        }

        Ok(ModelResponse { content, input_tokens, output_tokens })
    }
}

fn classify_request_error(e: &reqwest::Error) -> EngineError {
    if e.is_timeout() || e.is_connect() {
        EngineError::TransientRemote(e.to_string())
    } else {
        EngineError::Remote(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_messages_carry_system_prompt_first() {
        let wire = build_wire_messages("be helpful", &[]);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[0].content.as_deref(), Some("be helpful"));
    }

    #[test]
    fn tool_result_becomes_separate_tool_message() {
        let messages = vec![
            Message::assistant(vec![Block::ToolUse {
                id: "call_1".into(),
                name: "read".into(),
                input: serde_json::json!({"path": "a.rs"}),
            }]),
            Message::user(vec![Block::tool_result("call_1", "file contents", false)]),
        ];
        let wire = build_wire_messages("sys", &messages);
        // system, assistant (tool_calls), tool
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1].role, "assistant");
        assert!(wire[1].tool_calls.is_some());
        assert_eq!(wire[2].role, "tool");
        assert_eq!(wire[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn plain_text_message_has_no_tool_calls() {
        let messages = vec![Message::user_text("hello")];
        let wire = build_wire_messages("sys", &messages);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[1].content.as_deref(), Some("hello"));
        assert!(wire[1].tool_calls.is_none());
    }
}
