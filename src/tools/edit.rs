//! `edit` tool: exact or whitespace-fuzzy string replacement, plus an append
//! mode. Anchors the edit site against a short hash so stale reads are
//! caught instead of silently clobbering changed content.
use serde_json::Value;
use std::fs;

use crate::error::ToolError;
use crate::tools::read::{format_line, line_hash};

pub fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": "File path to edit" },
            "old_str": {
                "type": "string",
                "description": "Exact string to find and replace; must be unique in the file. Omit when append=true."
            },
            "new_str": {
                "type": "string",
                "description": "Replacement string, or content to append when append=true"
            },
            "anchor": {
                "type": "string",
                "description": "The 4-char hash from the read tool's line prefix, e.g. 'a3f2' from '  42 [a3f2] | fn foo'"
            },
            "append": { "type": "boolean", "description": "Append new_str to the end of the file" }
        },
        "required": ["path", "new_str"]
    })
}

pub fn canonical_arg(args: &Value) -> String {
    args["path"].as_str().unwrap_or_default().to_string()
}

pub fn pre_image(args: &Value) -> Option<String> {
    let path = args["path"].as_str()?;
    fs::read_to_string(path).ok()
}

pub fn execute(args: &Value) -> Result<String, ToolError> {
    let path = args["path"].as_str().ok_or(ToolError::MissingArgument("path"))?;
    let new_str = args["new_str"].as_str().ok_or(ToolError::MissingArgument("new_str"))?;

    if args["append"].as_bool().unwrap_or(false) {
        let mut content = fs::read_to_string(path).map_err(|e| ToolError::Io(path.to_string(), e))?;
        if !content.ends_with('\n') {
            content.push('\n');
        }
        if !content.ends_with("\n\n") {
            content.push('\n');
        }
        content.push_str(new_str);
        if !content.ends_with('\n') {
            content.push('\n');
        }
        let append_start_line = content.lines().count().saturating_sub(new_str.lines().count()) + 1;
        fs::write(path, &content).map_err(|e| ToolError::Io(path.to_string(), e))?;
        let added = new_str.lines().count();
        let ctx = post_edit_context(path, append_start_line);
        return Ok(format!("Appended {added} lines to {path}{ctx}"));
    }

    let old_str = args["old_str"]
        .as_str()
        .ok_or(ToolError::MissingArgument("old_str"))?;

    if old_str.trim().len() < 8 {
        return Err(ToolError::InvalidArgument(format!(
            "old_str is too short ({} chars after trimming) — include at least one full line of surrounding context",
            old_str.trim().len()
        )));
    }

    let content = fs::read_to_string(path).map_err(|e| ToolError::Io(path.to_string(), e))?;

    if let Some(anchor_raw) = args["anchor"].as_str() {
        let anchor: String = if anchor_raw.starts_with('[') && anchor_raw.ends_with(']') {
            anchor_raw[1..anchor_raw.len() - 1].to_string()
        } else if let Some(pos) = anchor_raw.rfind('#') {
            anchor_raw[pos + 1..].to_string()
        } else {
            anchor_raw.to_string()
        };
        let first_line = old_str.lines().next().unwrap_or("");
        let actual_hash = line_hash(first_line);
        if actual_hash != anchor {
            let line_info = content
                .lines()
                .enumerate()
                .find(|(_, l)| *l == first_line)
                .map(|(i, _)| format!(" (found at line {} with a different hash)", i + 1))
                .unwrap_or_else(|| " (line not found in current file — content may have changed)".to_string());
            return Err(ToolError::Rejected(format!(
                "anchor mismatch for '{path}' — expected hash '{anchor}' but got '{actual_hash}'{line_info}. \
                 Re-read the file to get current hashes."
            )));
        }
    }

    let exact_count = content.matches(old_str).count();
    if exact_count == 1 {
        let edit_byte = content.find(old_str).unwrap_or(0);
        let anchor_line = content[..edit_byte].lines().count() + 1;
        let new_content = content.replacen(old_str, new_str, 1);
        fs::write(path, &new_content).map_err(|e| ToolError::Io(path.to_string(), e))?;
        let ctx = post_edit_context(path, anchor_line);
        return Ok(format!("Edited {path} (1 replacement){ctx}"));
    }
    if exact_count > 1 {
        return Err(ToolError::InvalidArgument(format!(
            "old_str matches {exact_count} locations in '{path}' — it must match exactly once; \
             add more surrounding context to disambiguate"
        )));
    }

    if let Some((matched_span, label)) = fuzzy_find(&content, old_str) {
        let edit_byte = content.find(&matched_span).unwrap_or(0);
        let anchor_line = content[..edit_byte].lines().count() + 1;
        let new_content = content.replacen(&matched_span, new_str, 1);
        fs::write(path, &new_content).map_err(|e| ToolError::Io(path.to_string(), e))?;
        let ctx = post_edit_context(path, anchor_line);
        return Ok(format!("Edited {path} (fuzzy match — {label}){ctx}"));
    }

    let hint = best_match_context(&content, old_str);
    Err(ToolError::Rejected(format!(
        "string not found in '{path}'. Check whitespace and exact characters.\n{hint}"
    )))
}

fn fuzzy_find(content: &str, old_str: &str) -> Option<(String, &'static str)> {
    let content_lf = content.replace("\r\n", "\n");
    let old_lf = old_str.replace("\r\n", "\n");
    if content_lf != *content {
        if let Some(span) = single_match(&content_lf, &old_lf) {
            let crlf_span = span.replace('\n', "\r\n");
            if content.matches(&crlf_span).count() == 1 {
                return Some((crlf_span, "CRLF normalised"));
            }
        }
    }

    if let Some(span) = line_normalised_match(content, old_str, |l| l.trim()) {
        return Some((span, "whitespace trimmed"));
    }

    if let Some(span) = line_normalised_match(content, old_str, |l| l.trim_end()) {
        return Some((span, "trailing whitespace trimmed"));
    }

    None
}

fn line_normalised_match<F>(content: &str, old_str: &str, norm: F) -> Option<String>
where
    F: Fn(&str) -> &str,
{
    let old_lines: Vec<&str> = old_str.lines().collect();
    if old_lines.is_empty() {
        return None;
    }
    let old_normalised: Vec<&str> = old_lines.iter().map(|l| norm(l)).collect();
    let n = old_lines.len();

    let content_lines: Vec<&str> = content.lines().collect();
    let mut candidates: Vec<(usize, usize)> = Vec::new();

    'outer: for start in 0..content_lines.len().saturating_sub(n - 1) {
        for (i, old_norm) in old_normalised.iter().enumerate() {
            if norm(content_lines[start + i]) != *old_norm {
                continue 'outer;
            }
        }
        candidates.push((start, start + n));
    }

    if candidates.len() != 1 {
        return None;
    }

    let (start, end) = candidates[0];
    let span = content_lines[start..end].join("\n");
    if content.matches(span.as_str()).count() == 1 {
        Some(span)
    } else {
        None
    }
}

fn single_match<'a>(haystack: &'a str, needle: &str) -> Option<&'a str> {
    if haystack.matches(needle).count() == 1 {
        let pos = haystack.find(needle)?;
        Some(&haystack[pos..pos + needle.len()])
    } else {
        None
    }
}

fn best_match_context(content: &str, old_str: &str) -> String {
    let target = old_str.lines().next().unwrap_or("").trim();
    if target.is_empty() {
        return "Use read to verify the content first.".to_string();
    }

    let lines: Vec<&str> = content.lines().collect();
    let best = lines.iter().enumerate().max_by_key(|(_, l)| common_prefix_len(l.trim(), target));

    let Some((best_idx, _)) = best else {
        return "Use read to verify the content first.".to_string();
    };

    let lo = best_idx.saturating_sub(15);
    let hi = (best_idx + 15).min(lines.len());
    let context: String = lines[lo..hi]
        .iter()
        .enumerate()
        .map(|(i, l)| format_line(lo + i + 1, l))
        .collect();

    format!("Nearest match around line {} (use these hashes for anchor):\n{}", best_idx + 1, context)
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

fn post_edit_context(path: &str, anchor_line: usize) -> String {
    let Ok(content) = fs::read_to_string(path) else {
        return String::new();
    };
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    if total == 0 {
        return String::new();
    }
    let centre = anchor_line.saturating_sub(1).min(total - 1);
    let lo = centre.saturating_sub(10);
    let hi = (centre + 10).min(total);

    let mut out = format!("\n[{path} after edit — lines {}-{} of {total}]\n", lo + 1, hi);
    for (i, line) in lines[lo..hi].iter().enumerate() {
        out.push_str(&format_line(lo + i + 1, line));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn exact_unique_replacement_succeeds() {
        let f = file_with("fn main() {\n    println!(\"hi\");\n}\n");
        let args = serde_json::json!({
            "path": f.path().to_str().unwrap(),
            "old_str": "println!(\"hi\");",
            "new_str": "println!(\"bye\");",
        });
        let out = execute(&args).unwrap();
        assert!(out.contains("1 replacement"));
        assert!(fs::read_to_string(f.path()).unwrap().contains("bye"));
    }

    #[test]
    fn rejects_ambiguous_old_str() {
        let f = file_with("let x = 1;\nlet x = 1;\n");
        let args = serde_json::json!({
            "path": f.path().to_str().unwrap(),
            "old_str": "let x = 1;",
            "new_str": "let x = 2;",
        });
        assert!(execute(&args).is_err());
    }

    #[test]
    fn rejects_too_short_old_str() {
        let f = file_with("{}\n");
        let args = serde_json::json!({
            "path": f.path().to_str().unwrap(),
            "old_str": "{}",
            "new_str": "{ }",
        });
        assert!(execute(&args).is_err());
    }

    #[test]
    fn append_mode_adds_trailing_content() {
        let f = file_with("line one\n");
        let args = serde_json::json!({
            "path": f.path().to_str().unwrap(),
            "new_str": "line two",
            "append": true,
        });
        let out = execute(&args).unwrap();
        assert!(out.contains("Appended 1 lines"));
        assert!(fs::read_to_string(f.path()).unwrap().contains("line two"));
    }

    #[test]
    fn anchor_mismatch_is_rejected() {
        let f = file_with("fn main() {\n    let x = 1;\n}\n");
        let args = serde_json::json!({
            "path": f.path().to_str().unwrap(),
            "old_str": "    let x = 1;",
            "new_str": "    let x = 2;",
            "anchor": "ffff",
        });
        assert!(execute(&args).is_err());
    }

    #[test]
    fn fuzzy_match_tolerates_trailing_whitespace() {
        let f = file_with("fn main() {   \n    body();\n}\n");
        let args = serde_json::json!({
            "path": f.path().to_str().unwrap(),
            "old_str": "fn main() {\n    body();",
            "new_str": "fn main() {\n    other();",
        });
        assert!(execute(&args).is_ok());
    }
}
