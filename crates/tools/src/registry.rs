//! Maps [`ToolName`]s to `Tool` implementations and dispatches calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::builtin::{LlmTool, OperatorExecTool, PlanTool, RagSearchTool, WebSearchTool};
use crate::{Providers, Tool, ToolContext, ToolError, ToolInput, ToolName, ToolOutput};

/// Default per-invocation time limit.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
    default_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            default_timeout,
        }
    }

    /// Register a tool, replacing any previous implementation of that name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name).cloned()
    }

    pub fn contains(&self, name: ToolName) -> bool {
        self.tools.contains_key(&name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<ToolName> {
        let mut names: Vec<_> = self.tools.keys().copied().collect();
        names.sort();
        names
    }

    /// Decode a raw JSON payload for `tool` and run it, returning the
    /// untagged JSON output.
    pub async fn dispatch(
        &self,
        ctx: &ToolContext,
        tool: ToolName,
        input: Value,
    ) -> Result<Value, ToolError> {
        let typed = ToolInput::parse(tool, input)?;
        self.call(ctx, typed).await.map(ToolOutput::into_value)
    }

    /// Run a typed call, bounded by the tool's time limit.
    pub async fn call(&self, ctx: &ToolContext, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let name = input.tool();
        let tool = self.get(name).ok_or(ToolError::NotRegistered(name))?;
        let limit = tool.timeout().unwrap_or(self.default_timeout);

        debug!(tool = %name, timeout_secs = limit.as_secs(), "dispatching tool");

        let output = tokio::time::timeout(limit, tool.execute(ctx, input))
            .await
            .map_err(|_| ToolError::Timeout {
                tool: name,
                secs: limit.as_secs(),
            })??;

        if output.tool() != name {
            return Err(ToolError::failed(
                name,
                format!("returned output for '{}'", output.tool()),
            ));
        }

        Ok(output)
    }

    /// Create a registry with every built-in tool wired to `providers`.
    pub fn with_builtins(providers: Providers, default_timeout: Duration) -> Self {
        let llm = Arc::new(LlmTool::new(providers.completion.clone()));

        let mut registry = Self::new(default_timeout);
        registry.register(PlanTool::new(providers.completion));
        registry.register_arc(llm.clone());
        registry.register(WebSearchTool::new(providers.search));
        registry.register(OperatorExecTool::new(providers.sandbox));
        registry.register(RagSearchTool::new(providers.retriever, llm));
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::LlmOutput;
    use crate::mock::{MockCompletion, MockTool, RecordingBilling};
    use crate::providers::{DisabledSandbox, NoRetriever, Unconfigured};
    use serde_json::json;

    fn ctx() -> ToolContext {
        ToolContext::new("u1", None, "m", Arc::new(RecordingBilling::default()))
    }

    #[test]
    fn builtins_cover_every_tool() {
        let providers = Providers {
            completion: Arc::new(Unconfigured),
            search: Arc::new(Unconfigured),
            sandbox: Arc::new(DisabledSandbox),
            retriever: Arc::new(NoRetriever),
        };
        let registry = ToolRegistry::with_builtins(providers, DEFAULT_TOOL_TIMEOUT);
        assert_eq!(registry.names(), ToolName::ALL.to_vec());
    }

    #[tokio::test]
    async fn dispatch_decodes_and_returns_untagged_json() {
        let mut registry = ToolRegistry::default();
        registry.register(LlmTool::new(Arc::new(MockCompletion::replying("pong"))));

        let out = registry
            .dispatch(&ctx(), ToolName::Llm, json!({ "prompt": "ping" }))
            .await
            .unwrap();
        assert_eq!(out, json!({ "text": "pong" }));
    }

    #[tokio::test]
    async fn unregistered_tool_is_an_error() {
        let registry = ToolRegistry::default();
        let err = registry
            .dispatch(&ctx(), ToolName::WebSearch, json!({ "query": "q" }))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::NotRegistered(ToolName::WebSearch));
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_tool() {
        let mock = MockTool::returning(ToolOutput::Llm(LlmOutput { text: "x".into() }));
        let calls = mock.calls.clone();
        let mut registry = ToolRegistry::default();
        registry.register(mock);

        let err = registry
            .dispatch(&ctx(), ToolName::Llm, json!({ "wrong": 1 }))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::InvalidInput { .. }));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let mock = MockTool::returning(ToolOutput::Llm(LlmOutput { text: "late".into() }))
            .with_delay(Duration::from_secs(10));
        let mut registry = ToolRegistry::new(Duration::from_secs(1));
        registry.register(mock);

        let err = registry
            .dispatch(&ctx(), ToolName::Llm, json!("hi"))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Timeout { tool: ToolName::Llm, secs: 1 });
    }
}
