//! `web_search` tool: thin wrapper over a configurable search API
//! (Brave-Search-shaped JSON response), returning a formatted result list.
use serde::Deserialize;
use serde_json::Value;

use crate::error::ToolError;

const ENDPOINT_ENV: &str = "MILO_SEARCH_ENDPOINT";
const API_KEY_ENV: &str = "MILO_SEARCH_API_KEY";
const DEFAULT_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

pub fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "Search query" }
        },
        "required": ["query"]
    })
}

pub fn canonical_arg(args: &Value) -> String {
    args["query"].as_str().unwrap_or_default().to_string()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Debug, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

pub async fn execute(args: &Value) -> Result<String, ToolError> {
    let query = args["query"].as_str().ok_or(ToolError::MissingArgument("query"))?;

    let Ok(api_key) = std::env::var(API_KEY_ENV) else {
        return Err(ToolError::Rejected(format!(
            "web_search is not configured — set {API_KEY_ENV} to enable it"
        )));
    };
    let endpoint = std::env::var(ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());

    let client = reqwest::Client::new();
    let response = client
        .get(&endpoint)
        .query(&[("q", query)])
        .header("X-Subscription-Token", api_key)
        .send()
        .await
        .map_err(|e| ToolError::Rejected(format!("search request failed: {e}")))?;

    let parsed: SearchResponse = response
        .json()
        .await
        .map_err(|e| ToolError::Rejected(format!("search response could not be parsed: {e}")))?;

    let results = parsed.web.map(|w| w.results).unwrap_or_default();
    if results.is_empty() {
        return Ok(format!("No results for '{query}'"));
    }

    let mut out = String::new();
    for (i, r) in results.iter().take(10).enumerate() {
        out.push_str(&format!("{}. {} — {}\n   {}\n", i + 1, r.title, r.url, r.description));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_search_reports_missing_key() {
        std::env::remove_var(API_KEY_ENV);
        let args = serde_json::json!({ "query": "rust async" });
        let err = execute(&args).await.unwrap_err();
        assert!(matches!(err, ToolError::Rejected(_)));
    }
}
