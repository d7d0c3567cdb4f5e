//! `undo` tool: pop the most recent mutation off the edit history and
//! reverse it on disk.
use serde_json::Value;
use std::fs;

use crate::error::ToolError;
use crate::tools::EditRecord;

pub fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

pub fn canonical_arg(_args: &Value) -> String {
    String::new()
}

/// Reverse the given edit record on disk. Called by the tool context after
/// popping the history stack (see `tools::mod::dispatch`).
pub fn apply(record: &EditRecord) -> Result<String, ToolError> {
    match record {
        EditRecord::Write { path, pre_image: Some(content) } => {
            fs::write(path, content).map_err(|e| ToolError::Io(path.clone(), e))?;
            Ok(format!("Restored {path} to its previous content"))
        }
        EditRecord::Write { path, pre_image: None } => {
            fs::remove_file(path).map_err(|e| ToolError::Io(path.clone(), e))?;
            Ok(format!("Removed {path} (it did not exist before the mutation)"))
        }
        EditRecord::Move { from, to } => {
            fs::rename(to, from).map_err(|e| ToolError::Io(format!("{to} -> {from}"), e))?;
            Ok(format!("Moved {to} back to {from}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn restores_overwritten_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, "new").unwrap();
        let record = EditRecord::Write { path: path.to_str().unwrap().to_string(), pre_image: Some("old".to_string()) };
        apply(&record).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
    }

    #[test]
    fn removes_file_created_by_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, "new").unwrap();
        let record = EditRecord::Write { path: path.to_str().unwrap().to_string(), pre_image: None };
        apply(&record).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn reverses_a_move() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        fs::write(&to, "hi").unwrap();
        let record = EditRecord::Move {
            from: from.to_str().unwrap().to_string(),
            to: to.to_str().unwrap().to_string(),
        };
        apply(&record).unwrap();
        assert!(from.exists());
        assert!(!to.exists());
    }
}
