//! `todo` tool: replaces the shared todo list for the session. Not
//! parallel-safe — it mutates engine state rather than the filesystem.
use serde_json::Value;

use crate::error::ToolError;
use crate::todo::{TodoItem, TodoStatus, TodoStore};

pub fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "content": { "type": "string" },
                        "active_form": { "type": "string" },
                        "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] }
                    },
                    "required": ["content", "active_form", "status"]
                }
            }
        },
        "required": ["items"]
    })
}

pub fn canonical_arg(args: &Value) -> String {
    args["items"]
        .as_array()
        .map(|a| a.len().to_string())
        .unwrap_or_else(|| "0".to_string())
}

pub fn execute(store: &TodoStore, args: &Value) -> Result<String, ToolError> {
    let raw = args["items"].as_array().ok_or(ToolError::MissingArgument("items"))?;
    let mut items = Vec::with_capacity(raw.len());
    for entry in raw {
        let content = entry["content"]
            .as_str()
            .ok_or(ToolError::InvalidArgument("todo item missing 'content'".to_string()))?
            .to_string();
        let active_form = entry["active_form"]
            .as_str()
            .ok_or(ToolError::InvalidArgument("todo item missing 'active_form'".to_string()))?
            .to_string();
        let status = match entry["status"].as_str() {
            Some("pending") => TodoStatus::Pending,
            Some("in_progress") => TodoStatus::InProgress,
            Some("completed") => TodoStatus::Completed,
            _ => return Err(ToolError::InvalidArgument("todo item has an invalid 'status'".to_string())),
        };
        items.push(TodoItem { content, active_form, status });
    }

    let count = items.len();
    store
        .replace(items)
        .map_err(|e| ToolError::Rejected(e.0))?;
    Ok(format!("Updated todo list ({count} items)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_store_from_args() {
        let store = TodoStore::new();
        let args = serde_json::json!({
            "items": [
                { "content": "write tests", "active_form": "Writing tests", "status": "in_progress" }
            ]
        });
        let out = execute(&store, &args).unwrap();
        assert!(out.contains("1 items"));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn rejects_invalid_status() {
        let store = TodoStore::new();
        let args = serde_json::json!({
            "items": [{ "content": "x", "active_form": "X", "status": "bogus" }]
        });
        assert!(execute(&store, &args).is_err());
    }
}
