//! `glob` tool: recursive file-pattern matching, grounded on `list_dir`'s
//! walk but filtering by a glob pattern instead of depth.
use glob::Pattern;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ToolError;

const MAX_RESULTS: usize = 200;
static IGNORED_DIRS: &[&str] = &["node_modules", ".git", "target", ".next", "dist", "build", "__pycache__", ".venv", "venv"];

pub fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "pattern": { "type": "string", "description": "Glob pattern, e.g. 'src/**/*.rs'" },
            "path": { "type": "string", "description": "Root directory to search from (default: .)" }
        },
        "required": ["pattern"]
    })
}

pub fn canonical_arg(args: &Value) -> String {
    args["pattern"].as_str().unwrap_or_default().to_string()
}

pub fn execute(args: &Value) -> Result<String, ToolError> {
    let pattern_str = args["pattern"].as_str().ok_or(ToolError::MissingArgument("pattern"))?;
    let root = args["path"].as_str().unwrap_or(".");
    let pattern = Pattern::new(pattern_str)
        .map_err(|e| ToolError::InvalidArgument(format!("bad glob pattern '{pattern_str}': {e}")))?;

    let mut matches: Vec<PathBuf> = Vec::new();
    let mut truncated = false;
    walk(Path::new(root), root, &pattern, &mut matches, &mut truncated);

    if matches.is_empty() {
        return Ok(format!("No files matched '{pattern_str}' under {root}"));
    }

    let mut out = String::new();
    for path in &matches {
        out.push_str(&path.display().to_string());
        out.push('\n');
    }
    if truncated {
        out.push_str(&format!("[truncated at {MAX_RESULTS} matches — narrow the pattern]\n"));
    } else {
        out.push_str(&format!("[{} matches]\n", matches.len()));
    }
    Ok(out)
}

fn walk(dir: &Path, root: &str, pattern: &Pattern, matches: &mut Vec<PathBuf>, truncated: &mut bool) {
    if *truncated {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.filter_map(|e| e.ok()) {
        if *truncated {
            return;
        }
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let name = entry.file_name();
        let name_str = name.to_string_lossy();

        if is_dir {
            if IGNORED_DIRS.contains(&name_str.as_ref()) {
                continue;
            }
            walk(&path, root, pattern, matches, truncated);
            continue;
        }

        let rel = path.strip_prefix(root).unwrap_or(&path);
        if pattern.matches_path(rel) || pattern.matches_path(&path) {
            matches.push(rel.to_path_buf());
            if matches.len() >= MAX_RESULTS {
                *truncated = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn matches_nested_extension() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/tools")).unwrap();
        fs::write(dir.path().join("src/tools/bash.rs"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let args = serde_json::json!({ "pattern": "src/**/*.rs", "path": dir.path().to_str().unwrap() });
        let out = execute(&args).unwrap();
        assert!(out.contains("bash.rs"));
        assert!(!out.contains("README.md"));
    }
}
