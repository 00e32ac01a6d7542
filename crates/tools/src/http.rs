//! HTTP-backed providers.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::io::SearchResult;
use crate::providers::{CompletionProvider, SearchProvider};
use crate::ToolError;

/// Completion provider for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompletion {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompletion {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ToolError> {
        debug!(model, prompt_chars = prompt.len(), "requesting completion");

        let body: Value = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": model,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ToolError::provider(e.to_string()))?
            .json()
            .await
            .map_err(|e| ToolError::provider(e.to_string()))?;

        extract_completion(&body)
            .map(str::to_owned)
            .ok_or_else(|| ToolError::provider("completion response had no message content"))
    }
}

fn extract_completion(body: &Value) -> Option<&str> {
    body["choices"][0]["message"]["content"].as_str()
}

/// Search provider backed by the Tavily API.
pub struct TavilySearch {
    http: reqwest::Client,
    api_key: String,
}

impl TavilySearch {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(
        &self,
        query: &str,
        _provider: Option<&str>,
    ) -> Result<Vec<SearchResult>, ToolError> {
        let body: Value = self
            .http
            .post("https://api.tavily.com/search")
            .json(&json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": 5,
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ToolError::provider(e.to_string()))?
            .json()
            .await
            .map_err(|e| ToolError::provider(e.to_string()))?;

        Ok(parse_tavily_results(&body))
    }
}

fn parse_tavily_results(body: &Value) -> Vec<SearchResult> {
    body["results"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|r| SearchResult {
                    title: r["title"].as_str().unwrap_or("").to_string(),
                    snippet: r["content"].as_str().unwrap_or("").to_string(),
                    url: r["url"].as_str().unwrap_or("").to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice_content() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "hello" } }]
        });
        assert_eq!(extract_completion(&body), Some("hello"));
        assert_eq!(extract_completion(&json!({ "choices": [] })), None);
    }

    #[test]
    fn maps_tavily_fields() {
        let body = json!({
            "results": [
                { "title": "Rust", "content": "A language", "url": "https://rust-lang.org" },
                { "title": "No url" }
            ]
        });
        let results = parse_tavily_results(&body);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].snippet, "A language");
        assert_eq!(results[1].url, "");
    }

    #[test]
    fn missing_results_is_empty() {
        assert!(parse_tavily_results(&json!({})).is_empty());
    }
}
