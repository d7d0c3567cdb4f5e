//! `read` tool: line-numbered file excerpts with a symbol index for
//! navigating large files, and short anchor hashes for loop-free edits.
use serde_json::Value;
use std::fs;

use crate::error::ToolError;

const DEFAULT_MAX_LINES: usize = 150;
const PREAMBLE_LINES: usize = 50;
const TAIL_LINES: usize = 20;

pub fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": "File path to read" },
            "line_range": {
                "type": "array",
                "items": { "type": "integer" },
                "description": "Optional [start, end] (1-indexed, inclusive)"
            },
            "symbols": {
                "type": "boolean",
                "description": "Return a symbol index instead of file content"
            }
        },
        "required": ["path"]
    })
}

pub fn canonical_arg(args: &Value) -> String {
    args["path"].as_str().unwrap_or_default().to_string()
}

pub fn execute(args: &Value) -> Result<String, ToolError> {
    let path = args["path"].as_str().ok_or(ToolError::MissingArgument("path"))?;
    let content = fs::read_to_string(path).map_err(|e| ToolError::Io(path.to_string(), e))?;

    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();

    if args["symbols"].as_bool().unwrap_or(false) {
        return Ok(build_symbol_index(&lines, path, total));
    }

    if let Some(range) = args["line_range"].as_array() {
        let start = range
            .first()
            .and_then(|v| v.as_u64())
            .map(|n| (n as usize).saturating_sub(1))
            .unwrap_or(0)
            .min(total.saturating_sub(1));
        let end = range
            .get(1)
            .and_then(|v| v.as_u64())
            .map(|n| (n as usize).min(total))
            .unwrap_or(total);
        return Ok(format_excerpt(&lines, start, end, total, path));
    }

    if total <= DEFAULT_MAX_LINES {
        return Ok(format_full(&lines, path));
    }

    let preamble_end = PREAMBLE_LINES.min(total);
    let tail_start = total.saturating_sub(TAIL_LINES).max(preamble_end);

    let mut out = String::new();
    out.push_str(&format!(
        "[{path} — {total} lines total. Showing preamble (1-{preamble_end}) and tail ({}-{total}). \
         Use symbols=true to find definitions, or line_range=[start,end] to read a section.]\n\n",
        tail_start + 1
    ));
    for (i, line) in lines[..preamble_end].iter().enumerate() {
        out.push_str(&format_line(i + 1, line));
    }
    if tail_start > preamble_end {
        out.push_str(&format!("\n     ... ({} lines omitted) ...\n\n", tail_start - preamble_end));
    }
    for (i, line) in lines[tail_start..].iter().enumerate() {
        out.push_str(&format_line(tail_start + i + 1, line));
    }

    Ok(out)
}

fn build_symbol_index(lines: &[&str], path: &str, total: usize) -> String {
    let mut symbols: Vec<(usize, String)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if let Some(label) = classify_symbol(trimmed) {
            symbols.push((i + 1, label));
        }
    }

    if symbols.is_empty() {
        return format!("[{path} — {total} lines. No top-level symbols found. Use line_range to read sections.]\n");
    }

    let mut out = format!("[{path} — {total} lines. Symbol index:]\n\n");
    for (line_no, label) in &symbols {
        out.push_str(&format!("{line_no:4} | {label}\n"));
    }
    out.push_str("\nUse line_range=[start,end] to read any section.\n");
    out
}

fn classify_symbol(line: &str) -> Option<String> {
    if line.is_empty() || line.starts_with("//") || line.starts_with('#') || line.starts_with('*') || line.starts_with("/*") {
        return None;
    }

    for prefix in &[
        "pub async fn ", "pub fn ", "async fn ", "fn ",
        "pub struct ", "struct ",
        "pub enum ", "enum ",
        "impl ", "pub trait ", "trait ",
        "pub mod ", "mod ",
        "pub const ", "const ",
        "pub type ", "type ",
    ] {
        if let Some(rest) = line.strip_prefix(prefix) {
            let name = rest.split(|c: char| !c.is_alphanumeric() && c != '_').next().unwrap_or(rest);
            if !name.is_empty() {
                return Some(format!("{}{name}", prefix.trim_end().to_string() + " "));
            }
        }
    }

    for prefix in &[
        "export default function ", "export function ", "export class ",
        "export interface ", "export type ", "export enum ",
        "export const ", "export async function ",
        "function ", "class ", "interface ", "async function ",
    ] {
        if let Some(rest) = line.strip_prefix(prefix) {
            let name = rest.split(|c: char| c == '(' || c == '<' || c == ' ' || c == ':').next().unwrap_or(rest);
            if !name.is_empty() {
                return Some(format!("{}{name}", prefix.trim_end()));
            }
        }
    }

    for prefix in &["async def ", "def ", "class "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            let name = rest.split(|c: char| c == '(' || c == ':').next().unwrap_or(rest);
            if !name.is_empty() {
                return Some(format!("{prefix}{name}"));
            }
        }
    }

    if let Some(rest) = line.strip_prefix("func ") {
        let name = rest.split(|c: char| c == '(' || c == ' ').next().unwrap_or(rest);
        if !name.is_empty() {
            return Some(format!("func {name}"));
        }
    }

    None
}

fn format_full(lines: &[&str], path: &str) -> String {
    let mut out = format!("[{}]\n\n", path);
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&format_line(i + 1, line));
    }
    out
}

fn format_excerpt(lines: &[&str], start: usize, end: usize, total: usize, path: &str) -> String {
    let end = end.min(total);
    let mut out = format!("[{path} — lines {}-{} of {}]\n\n", start + 1, end, total);
    for (i, line) in lines[start..end].iter().enumerate() {
        out.push_str(&format_line(start + i + 1, line));
    }
    out
}

/// Render a line with its 1-indexed number and anchor hash:
/// `"  42 [a3f2] | fn foo() {\n"`.
pub fn format_line(line_no: usize, line: &str) -> String {
    format!("{:4} [{}] | {}\n", line_no, line_hash(line), line)
}

/// Short, stable 4-hex-char fingerprint of a line's exact text (FNV-1a,
/// truncated). Used only to detect stale edits, not for security.
pub fn line_hash(line: &str) -> String {
    let mut hash: u32 = 0x811c9dc5;
    for b in line.as_bytes() {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    format!("{:04x}", hash & 0xffff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use std::io::Write;

    #[test]
    fn line_hash_is_stable_and_sensitive() {
        assert_eq!(line_hash("fn foo()"), line_hash("fn foo()"));
        assert_ne!(line_hash("fn foo()"), line_hash("fn bar()"));
    }

    #[test]
    fn reads_small_file_in_full() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "line one\nline two").unwrap();
        let args = serde_json::json!({ "path": f.path().to_str().unwrap() });
        let out = execute(&args).unwrap();
        assert!(out.contains("line one"));
        assert!(out.contains("line two"));
    }

    #[test]
    fn respects_line_range() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "a\nb\nc\nd").unwrap();
        let args = serde_json::json!({ "path": f.path().to_str().unwrap(), "line_range": [2, 3] });
        let out = execute(&args).unwrap();
        assert!(out.contains("lines 2-3"));
        assert!(out.contains('b'));
        assert!(out.contains('c'));
        assert!(!out.contains(" | a\n"));
    }

    #[test]
    fn missing_file_is_tool_error() {
        let args = serde_json::json!({ "path": "/nonexistent/path/xyz" });
        assert!(execute(&args).is_err());
    }

    #[test]
    fn symbol_index_finds_rust_fns() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "pub fn hello() {{}}\nstruct Foo;").unwrap();
        let args = serde_json::json!({ "path": f.path().to_str().unwrap(), "symbols": true });
        let out = execute(&args).unwrap();
        assert!(out.contains("pub fn hello"));
        assert!(out.contains("struct Foo"));
    }
}
