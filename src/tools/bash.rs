//! `bash` tool: run a shell command with a timeout and output cap.
use serde_json::Value;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use crate::error::ToolError;

const MAX_OUTPUT_LINES: usize = 500;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "command": { "type": "string" },
            "timeout_secs": { "type": "integer", "description": "Default: 30" }
        },
        "required": ["command"]
    })
}

pub fn canonical_arg(args: &Value) -> String {
    args["command"].as_str().unwrap_or_default().to_string()
}

pub async fn execute(args: &Value) -> Result<String, ToolError> {
    let command = args["command"].as_str().ok_or(ToolError::MissingArgument("command"))?;
    let timeout_secs = args["timeout_secs"].as_u64().unwrap_or(DEFAULT_TIMEOUT_SECS);
    let duration = Duration::from_secs(timeout_secs);

    let fut = Command::new("sh").arg("-c").arg(command).output();

    let output = match timeout(duration, fut).await {
        Ok(result) => result.map_err(|e| ToolError::Io(command.to_string(), e))?,
        Err(_) => return Err(ToolError::Timeout(timeout_secs)),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let exit_code = output.status.code().unwrap_or(-1);

    let mut result = String::new();
    if exit_code != 0 {
        result.push_str(&format!("[exit code: {exit_code}]\n"));
    }

    let combined = if stderr.is_empty() {
        stdout.to_string()
    } else if stdout.is_empty() {
        stderr.to_string()
    } else {
        format!("{stdout}\n[stderr]\n{stderr}")
    };

    let lines: Vec<&str> = combined.lines().collect();
    let total = lines.len();

    if total == 0 {
        result.push_str("[no output]");
    } else if total <= MAX_OUTPUT_LINES {
        result.push_str(&combined);
    } else {
        for line in &lines[..MAX_OUTPUT_LINES] {
            result.push_str(line);
            result.push('\n');
        }
        result.push_str(&format!("[+{} lines truncated]", total - MAX_OUTPUT_LINES));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_simple_command() {
        let args = serde_json::json!({ "command": "echo hi" });
        let out = execute(&args).await.unwrap();
        assert!(out.contains("hi"));
    }

    #[tokio::test]
    async fn reports_nonzero_exit_code() {
        let args = serde_json::json!({ "command": "exit 3" });
        let out = execute(&args).await.unwrap();
        assert!(out.contains("[exit code: 3]"));
    }

    #[tokio::test]
    async fn times_out_long_commands() {
        let args = serde_json::json!({ "command": "sleep 5", "timeout_secs": 1 });
        assert!(matches!(execute(&args).await, Err(ToolError::Timeout(1))));
    }
}
