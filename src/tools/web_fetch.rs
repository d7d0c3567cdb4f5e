//! `web_fetch` tool: GET a URL and return its text content with tags
//! stripped to a plain-text approximation.
use serde_json::Value;

use crate::error::ToolError;

const MAX_CHARS: usize = 20_000;

pub fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "url": { "type": "string", "description": "URL to fetch" }
        },
        "required": ["url"]
    })
}

pub fn canonical_arg(args: &Value) -> String {
    args["url"].as_str().unwrap_or_default().to_string()
}

pub async fn execute(args: &Value) -> Result<String, ToolError> {
    let url = args["url"].as_str().ok_or(ToolError::MissingArgument("url"))?;

    let response = reqwest::get(url)
        .await
        .map_err(|e| ToolError::Rejected(format!("fetch failed for '{url}': {e}")))?;
    let body = response
        .text()
        .await
        .map_err(|e| ToolError::Rejected(format!("failed to read response body from '{url}': {e}")))?;

    let stripped = strip_tags(&body);
    if stripped.len() > MAX_CHARS {
        Ok(format!("{}\n[truncated at {MAX_CHARS} chars]", &stripped[..MAX_CHARS]))
    } else {
        Ok(stripped)
    }
}

/// Crude HTML-tag stripper: good enough for article/doc bodies, not a real
/// parser — markup-heavy pages will come through noisy.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        let html = "<html><body>  <h1>Title</h1>\n<p>Body   text</p></body></html>";
        assert_eq!(strip_tags(html), "Title Body text");
    }
}
