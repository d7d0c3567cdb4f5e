//! `grep` tool: ripgrep-backed content search with a `grep` fallback.
use serde_json::Value;
use std::process::Command;

use crate::error::ToolError;

const MAX_MATCHES: usize = 50;

pub fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "pattern": { "type": "string", "description": "Regex pattern" },
            "path": { "type": "string", "description": "Dir or file (default: .)" },
            "file_pattern": { "type": "string", "description": "Glob filter, e.g. '*.rs'" },
            "context_lines": { "type": "integer", "description": "Default: 2" }
        },
        "required": ["pattern"]
    })
}

pub fn canonical_arg(args: &Value) -> String {
    args["pattern"].as_str().unwrap_or_default().to_string()
}

pub fn execute(args: &Value) -> Result<String, ToolError> {
    let pattern = args["pattern"].as_str().ok_or(ToolError::MissingArgument("pattern"))?;
    let path = args["path"].as_str().unwrap_or(".");
    let context_lines = args["context_lines"].as_u64().unwrap_or(2);

    let mut cmd = Command::new("rg");
    cmd.arg("--line-number")
        .arg("--with-filename")
        .arg("--color=never")
        .arg(format!("--context={context_lines}"))
        .arg(pattern)
        .arg(path);

    if let Some(glob) = args["file_pattern"].as_str() {
        cmd.arg("--glob").arg(glob);
    }

    let output = match cmd.output() {
        Ok(o) => o,
        Err(_) => Command::new("grep")
            .arg("-rn")
            .arg(format!("-{context_lines}"))
            .arg(pattern)
            .arg(path)
            .output()
            .map_err(|e| ToolError::Io("grep".to_string(), e))?,
    };

    let stdout = String::from_utf8_lossy(&output.stdout);

    if stdout.trim().is_empty() {
        return Ok(format!("No matches for '{pattern}' in {path}"));
    }

    let lines: Vec<&str> = stdout.lines().collect();
    let total = lines.len();

    if total <= MAX_MATCHES {
        return Ok(format!("[{total} lines matched]\n{stdout}"));
    }

    let truncated: String = lines[..MAX_MATCHES].join("\n");
    Ok(format!("[Showing {MAX_MATCHES} of {total} result lines — refine pattern or path to narrow results]\n{truncated}"))
}
