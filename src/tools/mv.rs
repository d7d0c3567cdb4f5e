//! `move` tool: rename/relocate a file, creating destination parent dirs.
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::error::ToolError;

pub fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "from": { "type": "string", "description": "Existing file path" },
            "to": { "type": "string", "description": "Destination path" }
        },
        "required": ["from", "to"]
    })
}

pub fn canonical_arg(args: &Value) -> String {
    format!(
        "{} -> {}",
        args["from"].as_str().unwrap_or_default(),
        args["to"].as_str().unwrap_or_default()
    )
}

pub fn execute(args: &Value) -> Result<String, ToolError> {
    let from = args["from"].as_str().ok_or(ToolError::MissingArgument("from"))?;
    let to = args["to"].as_str().ok_or(ToolError::MissingArgument("to"))?;

    if !Path::new(from).exists() {
        return Err(ToolError::InvalidArgument(format!("'{from}' does not exist")));
    }
    if Path::new(to).exists() {
        return Err(ToolError::Rejected(format!("'{to}' already exists — refusing to overwrite via move")));
    }

    if let Some(parent) = Path::new(to).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ToolError::Io(to.to_string(), e))?;
        }
    }

    fs::rename(from, to).map_err(|e| ToolError::Io(format!("{from} -> {to}"), e))?;
    Ok(format!("Moved {from} -> {to}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn moves_file_to_new_path() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("nested/b.txt");
        fs::write(&from, "hi").unwrap();

        let args = serde_json::json!({ "from": from.to_str().unwrap(), "to": to.to_str().unwrap() });
        execute(&args).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "hi");
    }

    #[test]
    fn refuses_to_overwrite_destination() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        fs::write(&from, "hi").unwrap();
        fs::write(&to, "existing").unwrap();

        let args = serde_json::json!({ "from": from.to_str().unwrap(), "to": to.to_str().unwrap() });
        assert!(execute(&args).is_err());
    }
}
