//! Turn engine (C5): the streaming accumulate-then-dispatch state machine
//! that drives one agent turn from a user message to a final `Done` chunk.
//!
//! States: `Idle -> AwaitingModel -> Streaming -> Dispatching ->
//! AwaitingPermissions? -> Executing -> Completing`, looping back to
//! `AwaitingModel` for as long as the model keeps requesting tool calls.
//! `Error`/`Cancelled` are reachable from any state.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::client::Client;
use crate::context;
use crate::error::EngineError;
use crate::message::{Block, Message};
use crate::permissions::{ConfirmResponse, Decision, PermissionMatcher};
use crate::todo::TodoItem;
use crate::tokens::{estimate_messages, ContextLimits};
use crate::tools::{self, ToolContext};

/// Hard safety valve on tool calls per turn, independent of token budget —
/// stops a model stuck in a dispatch loop from running forever.
const DEFAULT_MAX_TOOL_CALLS: usize = 40;

const RETRY_DELAYS_MS: [u64; 3] = [100, 200, 400];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    AwaitingModel,
    Streaming,
    Dispatching,
    AwaitingPermissions,
    Executing,
    Completing,
}

/// A pending interactive permission check. The engine blocks on `respond`
/// until the consumer answers.
pub struct PermissionRequest {
    pub tool: String,
    pub canonical_arg: String,
    pub respond: oneshot::Sender<ConfirmResponse>,
}

/// Typed events the engine emits for the UI to render, in emission order.
pub enum Chunk {
    Text(String),
    ToolUse { id: String, name: String, input: Value },
    ToolResult { id: String, name: String, output: String, is_error: bool },
    PermissionRequest(PermissionRequest),
    ParallelProgress { completed: usize, total: usize },
    ContextCompacted { strategy: &'static str },
    TodoUpdate(Vec<TodoItem>),
    Done,
    Error(String),
}

pub type ChunkSender = mpsc::UnboundedSender<Chunk>;

pub struct Engine {
    client: Client,
    system_prompt: String,
    limits: ContextLimits,
    permissions: Mutex<PermissionMatcher>,
    tool_ctx: ToolContext,
    max_tool_calls: usize,
    cancelled: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(client: Client, system_prompt: String, limits: ContextLimits, permissions: PermissionMatcher, tool_ctx: ToolContext) -> Self {
        Engine {
            client,
            system_prompt,
            limits,
            permissions: Mutex::new(permissions),
            tool_ctx,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A cooperative cancellation handle: setting this stops the turn at
    /// its next checkpoint (between model calls and between tool batches).
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn permission_rules(&self) -> Vec<crate::permissions::Rule> {
        self.permissions.lock().unwrap().rules().to_vec()
    }

    pub fn add_permission_rule(&self, rule: crate::permissions::Rule) -> std::io::Result<()> {
        self.permissions.lock().unwrap().add_rule(rule)
    }

    /// Drive one full turn, appending to `messages` in place and streaming
    /// chunks to `tx`. Returns once the turn reaches `Done`, `Error`, or is
    /// cancelled.
    pub async fn run_turn(&self, messages: &mut Vec<Message>, user_text: String, tx: ChunkSender) -> Result<(), EngineError> {
        messages.push(Message::user_text(user_text));

        let mut tool_call_count = 0usize;
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(EngineError::Cancelled);
            }

            self.maybe_compact(messages, &tx).await;

            log_state(TurnState::AwaitingModel);
            log_state(TurnState::Streaming);
            let response = match self.chat_with_retry(&messages[..], &tx).await {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(Chunk::Error(e.to_string()));
                    return Err(e);
                }
            };

            let tool_uses: Vec<(String, String, Value)> = response
                .content
                .iter()
                .filter_map(|b| match b {
                    Block::ToolUse { id, name, input } => Some((id.clone(), name.clone(), input.clone())),
                    _ => None,
                })
                .collect();

            messages.push(Message::assistant(response.content));

            if tool_uses.is_empty() {
                let _ = tx.send(Chunk::Done);
                return Ok(());
            }

            log_state(TurnState::Dispatching);
            for (id, name, input) in &tool_uses {
                let _ = tx.send(Chunk::ToolUse { id: id.clone(), name: name.clone(), input: input.clone() });
            }

            tool_call_count += tool_uses.len();
            if tool_call_count > self.max_tool_calls {
                let e = EngineError::ToolBudgetExhausted(self.max_tool_calls);
                let _ = tx.send(Chunk::Error(e.to_string()));
                return Err(e);
            }

            if self.cancelled.load(Ordering::SeqCst) {
                return Err(EngineError::Cancelled);
            }

            let results = self.dispatch_batch(&tool_uses, &tx).await;

            let todos_before = self.tool_ctx.todos.snapshot();
            if tool_uses.iter().any(|(_, name, _)| name == "todo") {
                let todos_after = self.tool_ctx.todos.snapshot();
                if !same_todos(&todos_before, &todos_after) {
                    let _ = tx.send(Chunk::TodoUpdate(todos_after));
                }
            }

            log_state(TurnState::Completing);
            let result_blocks: Vec<Block> = results
                .into_iter()
                .map(|(id, is_error, output)| Block::ToolResult { tool_use_id: id, content: vec![output], is_error })
                .collect();
            messages.push(Message::user(result_blocks));
        }
    }

    async fn maybe_compact(&self, messages: &mut Vec<Message>, tx: &ChunkSender) {
        let current_tokens = estimate_messages(messages);
        if !self.limits.should_compact(current_tokens) {
            return;
        }
        let client = &self.client;
        let before_len = messages.len();
        let compacted = context::compact(messages.clone(), &self.limits, |msgs| async move {
            crate::summarizer::summarize(client, &msgs).await
        })
        .await;
        if compacted.len() != before_len {
            let strategy = if compacted.first().map(|m| context::is_summary_message(&m.text())).unwrap_or(false) {
                "summarization"
            } else {
                "truncation"
            };
            let _ = tx.send(Chunk::ContextCompacted { strategy });
        }
        *messages = compacted;
    }

    async fn chat_with_retry(&self, messages: &[Message], tx: &ChunkSender) -> Result<crate::client::ModelResponse, EngineError> {
        let tool_defs = tools::definitions();
        let mut attempt = 0usize;
        loop {
            let tx2 = tx.clone();
            match self
                .client
                .chat(&self.system_prompt, messages, &tool_defs, move |delta| {
                    let _ = tx2.send(Chunk::Text(delta.to_string()));
                })
                .await
            {
                Ok(response) => return Ok(response),
                Err(EngineError::TransientRemote(msg)) if attempt < RETRY_DELAYS_MS.len() => {
                    log::warn!("transient remote error ({msg}), retrying in {}ms", RETRY_DELAYS_MS[attempt]);
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAYS_MS[attempt])).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one batch of tool calls, preserving declaration order in the
    /// returned `(id, is_error, output)` triples regardless of whether the
    /// batch ran serially or concurrently.
    async fn dispatch_batch(&self, calls: &[(String, String, Value)], tx: &ChunkSender) -> Vec<(String, bool, String)> {
        let refs: Vec<(&str, &str, &Value)> = calls.iter().map(|(id, name, input)| (id.as_str(), name.as_str(), input)).collect();
        let parallel_safe = tools::batch_is_parallel_safe(&refs);
        let total = calls.len();

        if !parallel_safe || total == 1 {
            let mut out = Vec::with_capacity(total);
            for (i, (id, name, input)) in calls.iter().enumerate() {
                let (is_error, output) = self.run_one(id, name, input, tx).await;
                out.push((id.clone(), is_error, output));
                if total > 1 {
                    let _ = tx.send(Chunk::ParallelProgress { completed: i + 1, total });
                }
            }
            return out;
        }

        log_state(TurnState::Executing);
        // Permission prompts are interactive, so they're resolved one at a
        // time in declaration order even for a parallel-safe batch; only
        // the actual tool execution below runs concurrently.
        let mut decided = Vec::with_capacity(total);
        for (id, name, input) in calls {
            let allowed = self.check_permission(name, input, tx).await;
            decided.push((id.clone(), name.clone(), input.clone(), allowed));
        }

        let mut pending: FuturesUnordered<_> = decided
            .into_iter()
            .map(move |(id, name, input, allowed)| async move {
                if let Err(denial) = allowed {
                    return (id, true, denial);
                }
                match tools::dispatch(&self.tool_ctx, &name, &input).await {
                    Ok(output) => (id, false, output),
                    Err(e) => (id, true, e.to_string()),
                }
            })
            .collect();

        let mut completed = 0usize;
        let mut out = Vec::with_capacity(total);
        while let Some((id, is_error, output)) = pending.next().await {
            completed += 1;
            let _ = tx.send(Chunk::ParallelProgress { completed, total });
            out.push((id, is_error, output));
        }
        // Restore declaration order: FuturesUnordered yields by completion
        // time, but result ordering must match the model's original calls.
        let order: std::collections::HashMap<&str, usize> = calls.iter().enumerate().map(|(i, (id, _, _))| (id.as_str(), i)).collect();
        out.sort_by_key(|(id, _, _)| order[id.as_str()]);
        out
    }

    async fn run_one(&self, id: &str, name: &str, input: &Value, tx: &ChunkSender) -> (bool, String) {
        if let Err(denial) = self.check_permission(name, input, tx).await {
            return (true, denial);
        }
        match tools::dispatch(&self.tool_ctx, name, input).await {
            Ok(output) => {
                let _ = tx.send(Chunk::ToolResult { id: id.to_string(), name: name.to_string(), output: output.clone(), is_error: false });
                (false, output)
            }
            Err(e) => {
                let msg = e.to_string();
                let _ = tx.send(Chunk::ToolResult { id: id.to_string(), name: name.to_string(), output: msg.clone(), is_error: true });
                (true, msg)
            }
        }
    }

    /// Returns `Ok(())` if execution may proceed, `Err(message)` if denied.
    async fn check_permission(&self, name: &str, input: &Value, tx: &ChunkSender) -> Result<(), String> {
        let canonical_arg = tools::canonical_arg(name, input);
        let descriptor_requires_permission = tools::find(name).map(|d| d.requires_permission).unwrap_or(true);
        if !descriptor_requires_permission {
            return Ok(());
        }

        let decision = self.permissions.lock().unwrap().decide(name, &canonical_arg);
        match decision {
            Decision::Allow => Ok(()),
            Decision::Deny => Err("Permission denied by user".to_string()),
            Decision::Confirm => {
                log_state(TurnState::AwaitingPermissions);
                let (respond_tx, respond_rx) = oneshot::channel();
                let _ = tx.send(Chunk::PermissionRequest(PermissionRequest {
                    tool: name.to_string(),
                    canonical_arg: canonical_arg.clone(),
                    respond: respond_tx,
                }));
                match respond_rx.await {
                    Ok(ConfirmResponse::Granted) => Ok(()),
                    Ok(ConfirmResponse::GrantedAlways) => {
                        if let Err(e) = self.permissions.lock().unwrap().grant_always(name, &canonical_arg) {
                            log::warn!("failed to persist permission grant: {e}");
                        }
                        Ok(())
                    }
                    Ok(ConfirmResponse::Denied) | Err(_) => Err("Permission denied by user".to_string()),
                }
            }
        }
    }
}

fn same_todos(a: &[TodoItem], b: &[TodoItem]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.content == y.content && x.status == y.status)
}

fn log_state(state: TurnState) {
    log::debug!("turn engine state -> {state:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_todos_detects_status_change() {
        let a = vec![TodoItem { content: "x".into(), active_form: "X".into(), status: crate::todo::TodoStatus::Pending }];
        let b = vec![TodoItem { content: "x".into(), active_form: "X".into(), status: crate::todo::TodoStatus::Completed }];
        assert!(!same_todos(&a, &b));
        assert!(same_todos(&a, &a.clone()));
    }
}
