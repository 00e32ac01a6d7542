use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::io::{SearchResult, WebSearchInput, WebSearchOutput};
use crate::providers::SearchProvider;
use crate::traits::mismatched;
use crate::usage::estimate_tokens;
use crate::{Tool, ToolContext, ToolError, ToolInput, ToolName, ToolOutput};

/// Title of the stand-in result returned when the provider is unreachable.
pub const UNAVAILABLE_TITLE: &str = "Search unavailable";

/// Web search. Provider failures degrade to a single placeholder result and
/// are still billed the nominal search fee.
pub struct WebSearchTool {
    search: Arc<dyn SearchProvider>,
}

impl WebSearchTool {
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self { search }
    }

    pub async fn search(&self, ctx: &ToolContext, input: WebSearchInput) -> WebSearchOutput {
        let results = match self.search.search(&input.query, input.provider.as_deref()).await {
            Ok(results) => {
                ctx.bill(
                    estimate_tokens(&input.query),
                    0,
                    ToolName::WebSearch.as_str(),
                    Some(json!({ "results": results.len() })),
                );
                results
            }
            Err(e) => {
                warn!(query = %input.query, error = %e, "search provider failed, returning placeholder");
                ctx.bill(
                    estimate_tokens(&input.query),
                    0,
                    ToolName::WebSearch.as_str(),
                    Some(json!({ "degraded": true })),
                );
                vec![SearchResult {
                    title: UNAVAILABLE_TITLE.into(),
                    snippet: format!("No results for '{}': {e}", input.query),
                    url: String::new(),
                }]
            }
        };

        WebSearchOutput { results }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> ToolName {
        ToolName::WebSearch
    }

    async fn execute(&self, ctx: &ToolContext, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let ToolInput::WebSearch(input) = input else {
            return Err(mismatched(self.name(), &input));
        };
        Ok(ToolOutput::WebSearch(self.search(ctx, input).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockSearch, RecordingBilling};

    fn input(query: &str) -> WebSearchInput {
        WebSearchInput { query: query.into(), provider: None }
    }

    #[tokio::test]
    async fn returns_provider_results() {
        let billing = Arc::new(RecordingBilling::default());
        let ctx = ToolContext::new("u1", None, "m", billing.clone());
        let tool = WebSearchTool::new(Arc::new(MockSearch::returning(vec![SearchResult {
            title: "Rust".into(),
            snippet: "systems language".into(),
            url: "https://rust-lang.org".into(),
        }])));

        let out = tool.search(&ctx, input("rust")).await;
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].title, "Rust");
        assert_eq!(billing.charges().len(), 1);
    }

    #[tokio::test]
    async fn provider_failure_yields_placeholder_and_still_bills() {
        let billing = Arc::new(RecordingBilling::default());
        let ctx = ToolContext::new("u1", None, "m", billing.clone());
        let tool = WebSearchTool::new(Arc::new(MockSearch::failing("connection refused")));

        let out = tool
            .execute(&ctx, ToolInput::WebSearch(input("rust")))
            .await
            .unwrap();

        let ToolOutput::WebSearch(out) = out else {
            panic!("wrong output variant");
        };
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].title, UNAVAILABLE_TITLE);
        assert!(out.results[0].snippet.contains("connection refused"));

        let charges = billing.charges();
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].label, "web_search");
        assert_eq!(charges[0].meta, Some(json!({ "degraded": true })));
    }
}
