//! `write` tool: create or fully replace a file, with a content-preservation
//! guard against accidental truncating overwrites.
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::error::ToolError;

pub fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": "Path for the new file" },
            "content": { "type": "string", "description": "Full content to write" },
            "overwrite": {
                "type": "boolean",
                "description": "Only set true when intentionally replacing an entire existing file"
            }
        },
        "required": ["path", "content"]
    })
}

pub fn canonical_arg(args: &Value) -> String {
    args["path"].as_str().unwrap_or_default().to_string()
}

/// The file's content before this write, for the edit-history pre-image
/// (`None` means the file did not exist).
pub fn pre_image(args: &Value) -> Option<String> {
    let path = args["path"].as_str()?;
    fs::read_to_string(path).ok()
}

pub fn execute(args: &Value) -> Result<String, ToolError> {
    let path = args["path"].as_str().ok_or(ToolError::MissingArgument("path"))?;
    let content = args["content"].as_str().ok_or(ToolError::MissingArgument("content"))?;
    let overwrite = args["overwrite"].as_bool().unwrap_or(false);

    let file_exists = Path::new(path).exists();

    if file_exists && !overwrite {
        return Ok(format!(
            "'{path}' already exists — use edit to modify it, or pass overwrite=true to replace it entirely"
        ));
    }

    if file_exists && overwrite {
        if let Ok(existing) = fs::read_to_string(path) {
            let existing_lines = existing.lines().count();
            let new_lines = content.lines().count();
            if existing_lines >= 10 && new_lines < existing_lines * 7 / 10 {
                return Err(ToolError::Rejected(format!(
                    "'{path}' has {existing_lines} lines but new content has only {new_lines} lines — \
                     this would delete {del} lines of existing content. Use edit to modify specific \
                     sections instead of replacing the file.",
                    del = existing_lines.saturating_sub(new_lines),
                )));
            }
        }
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ToolError::Io(path.to_string(), e))?;
        }
    }

    let line_count = content.lines().count();
    fs::write(path, content).map_err(|e| ToolError::Io(path.to_string(), e))?;

    Ok(format!("Wrote {path} ({line_count} lines)"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.txt");
        let args = serde_json::json!({ "path": path.to_str().unwrap(), "content": "hello\n" });
        let out = execute(&args).unwrap();
        assert!(out.contains("Wrote"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn refuses_silent_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("existing.txt");
        fs::write(&path, "original\n").unwrap();
        let args = serde_json::json!({ "path": path.to_str().unwrap(), "content": "new\n" });
        let out = execute(&args).unwrap();
        assert!(out.contains("already exists"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "original\n");
    }

    #[test]
    fn rejects_drastic_shrink_even_with_overwrite_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.txt");
        let original: String = (0..20).map(|i| format!("line {i}\n")).collect();
        fs::write(&path, &original).unwrap();
        let args = serde_json::json!({
            "path": path.to_str().unwrap(),
            "content": "line 0\n",
            "overwrite": true,
        });
        assert!(execute(&args).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn allows_overwrite_when_larger() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small.txt");
        fs::write(&path, "a\nb\n").unwrap();
        let args = serde_json::json!({
            "path": path.to_str().unwrap(),
            "content": "a\nb\nc\nd\n",
            "overwrite": true,
        });
        assert!(execute(&args).is_ok());
    }
}
