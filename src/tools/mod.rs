//! Tool registry & dispatch (C3): a uniform descriptor per tool plus the
//! batch-execution policy (parallel-safe tools run concurrently, any serial
//! tool in a batch forces the whole batch serial).
pub mod bash;
pub mod edit;
pub mod glob;
pub mod grep;
pub mod list_dir;
pub mod mv;
pub mod read;
pub mod todo;
pub mod undo;
pub mod web_fetch;
pub mod web_search;
pub mod write;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::ToolError;
use crate::todo::TodoStore;

/// A record of a filesystem mutation, kept so `undo` can reverse it.
#[derive(Debug, Clone)]
pub enum EditRecord {
    Write { path: String, pre_image: Option<String> },
    Move { from: String, to: String },
}

/// Resources shared across tool invocations within a session.
pub struct ToolContext {
    pub edit_history: Arc<Mutex<Vec<EditRecord>>>,
    pub todos: Arc<TodoStore>,
}

impl ToolContext {
    pub fn new(todos: Arc<TodoStore>) -> Self {
        ToolContext { edit_history: Arc::new(Mutex::new(Vec::new())), todos }
    }
}

/// A tool's wire-facing shape, as sent to the model.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Registry metadata for dispatch policy and permission gating.
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: fn() -> Value,
    pub parallel_safe: bool,
    pub requires_permission: bool,
    pub canonical_arg: fn(&Value) -> String,
}

macro_rules! descriptor {
    ($name:literal, $desc:literal, $module:ident, $parallel:expr, $perm:expr) => {
        ToolDescriptor {
            name: $name,
            description: $desc,
            input_schema: $module::input_schema,
            parallel_safe: $parallel,
            requires_permission: $perm,
            canonical_arg: $module::canonical_arg,
        }
    };
}

pub fn registry() -> Vec<ToolDescriptor> {
    vec![
        descriptor!("read", "Read a file with line numbers, optionally a range or a symbol index.", read, true, false),
        descriptor!("write", "Create a new file or fully replace an existing one.", write, false, true),
        descriptor!("edit", "Replace an exact or fuzzily-matched string within a file.", edit, false, true),
        descriptor!("move", "Rename or relocate a file.", mv, false, true),
        descriptor!("list_dir", "List a directory tree, skipping common noise directories.", list_dir, true, false),
        descriptor!("glob", "Find files by glob pattern.", glob, true, false),
        descriptor!("grep", "Search file contents with ripgrep (or grep).", grep, true, false),
        descriptor!("undo", "Reverse the most recent file mutation.", undo, false, true),
        descriptor!("bash", "Run a shell command.", bash, false, true),
        descriptor!("web_fetch", "Fetch a URL and return its text content.", web_fetch, true, false),
        descriptor!("web_search", "Search the web for a query.", web_search, true, false),
        descriptor!("todo", "Replace the shared todo list.", todo, false, false),
    ]
}

pub fn definitions() -> Vec<ToolDefinition> {
    registry()
        .into_iter()
        .map(|d| ToolDefinition {
            name: d.name.to_string(),
            description: d.description.to_string(),
            input_schema: (d.input_schema)(),
        })
        .collect()
}

pub fn find(name: &str) -> Option<ToolDescriptor> {
    registry().into_iter().find(|d| d.name == name)
}

pub fn canonical_arg(name: &str, args: &Value) -> String {
    find(name).map(|d| (d.canonical_arg)(args)).unwrap_or_default()
}

/// Run a single named tool, recording and applying filesystem-mutation
/// bookkeeping where relevant.
pub async fn dispatch(ctx: &ToolContext, name: &str, args: &Value) -> Result<String, ToolError> {
    match name {
        "read" => read::execute(args),
        "write" => {
            let pre_image = write::pre_image(args);
            let result = write::execute(args)?;
            ctx.edit_history.lock().unwrap().push(EditRecord::Write {
                path: args["path"].as_str().unwrap_or_default().to_string(),
                pre_image,
            });
            Ok(result)
        }
        "edit" => {
            let pre_image = edit::pre_image(args);
            let result = edit::execute(args)?;
            ctx.edit_history.lock().unwrap().push(EditRecord::Write {
                path: args["path"].as_str().unwrap_or_default().to_string(),
                pre_image,
            });
            Ok(result)
        }
        "move" => {
            let result = mv::execute(args)?;
            ctx.edit_history.lock().unwrap().push(EditRecord::Move {
                from: args["from"].as_str().unwrap_or_default().to_string(),
                to: args["to"].as_str().unwrap_or_default().to_string(),
            });
            Ok(result)
        }
        "list_dir" => list_dir::execute(args),
        "glob" => glob::execute(args),
        "grep" => grep::execute(args),
        "undo" => {
            let record = ctx.edit_history.lock().unwrap().pop();
            match record {
                Some(r) => undo::apply(&r),
                None => Err(ToolError::Rejected("nothing to undo".to_string())),
            }
        }
        "bash" => bash::execute(args).await,
        "web_fetch" => web_fetch::execute(args).await,
        "web_search" => web_search::execute(args).await,
        "todo" => todo::execute(&ctx.todos, args),
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

/// Partition a batch of `(tool_use_id, name, args)` calls into the order the
/// engine should dispatch them in, per spec.md §4.3: if any call in the
/// batch is not parallel-safe, the whole batch runs serially, preserving
/// declaration order; otherwise all calls may run concurrently.
pub fn batch_is_parallel_safe(calls: &[(&str, &str, &Value)]) -> bool {
    calls.iter().all(|(_, name, _)| find(name).map(|d| d.parallel_safe).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_no_duplicate_names() {
        let names: Vec<&str> = registry().iter().map(|d| d.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names.len(), sorted.len());
    }

    #[test]
    fn batch_with_one_serial_tool_is_not_parallel_safe() {
        let a = serde_json::json!({});
        let calls = vec![("1", "read", &a), ("2", "bash", &a)];
        assert!(!batch_is_parallel_safe(&calls));
    }

    #[test]
    fn batch_of_all_readonly_tools_is_parallel_safe() {
        let a = serde_json::json!({});
        let calls = vec![("1", "read", &a), ("2", "grep", &a)];
        assert!(batch_is_parallel_safe(&calls));
    }

    #[tokio::test]
    async fn undo_reverses_last_write() {
        let ctx = ToolContext::new(Arc::new(TodoStore::new()));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "old").unwrap();

        let write_args = serde_json::json!({ "path": path.to_str().unwrap(), "content": "new", "overwrite": true });
        dispatch(&ctx, "write", &write_args).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");

        dispatch(&ctx, "undo", &serde_json::json!({})).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");
    }

    #[tokio::test]
    async fn unknown_tool_errors() {
        let ctx = ToolContext::new(Arc::new(TodoStore::new()));
        let err = dispatch(&ctx, "nope", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }
}
