use std::sync::Arc;

use async_trait::async_trait;

use crate::io::{LlmInput, LlmOutput};
use crate::providers::CompletionProvider;
use crate::traits::mismatched;
use crate::usage::estimate_tokens;
use crate::{Tool, ToolContext, ToolError, ToolInput, ToolName, ToolOutput};

/// Single completion call.
pub struct LlmTool {
    completion: Arc<dyn CompletionProvider>,
}

impl LlmTool {
    pub fn new(completion: Arc<dyn CompletionProvider>) -> Self {
        Self { completion }
    }

    /// Typed entry point, also used by `rag_search`.
    pub async fn complete(&self, ctx: &ToolContext, input: LlmInput) -> Result<LlmOutput, ToolError> {
        let ctx = match &input.model {
            Some(model) => ctx.with_model(model.as_str()),
            None => ctx.clone(),
        };

        let text = self.completion.complete(&ctx.model, &input.prompt).await?;

        ctx.bill(
            estimate_tokens(&input.prompt),
            estimate_tokens(&text),
            ToolName::Llm.as_str(),
            None,
        );

        Ok(LlmOutput { text })
    }
}

#[async_trait]
impl Tool for LlmTool {
    fn name(&self) -> ToolName {
        ToolName::Llm
    }

    async fn execute(&self, ctx: &ToolContext, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let ToolInput::Llm(input) = input else {
            return Err(mismatched(self.name(), &input));
        };
        self.complete(ctx, input).await.map(ToolOutput::Llm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCompletion, RecordingBilling};

    #[tokio::test]
    async fn bills_estimated_tokens() {
        let billing = Arc::new(RecordingBilling::default());
        let ctx = ToolContext::new("u1", None, "gpt-4o-mini", billing.clone());
        let tool = LlmTool::new(Arc::new(MockCompletion::replying("abcdefgh")));

        let out = tool
            .complete(&ctx, LlmInput { prompt: "abcd".into(), model: None })
            .await
            .unwrap();

        assert_eq!(out.text, "abcdefgh");
        let charges = billing.charges();
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].tokens_in, 1);
        assert_eq!(charges[0].tokens_out, 2);
        assert_eq!(charges[0].label, "llm");
        assert_eq!(charges[0].model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn model_override_is_priced_and_sent() {
        let billing = Arc::new(RecordingBilling::default());
        let ctx = ToolContext::new("u1", None, "gpt-4o-mini", billing.clone());
        let completion = Arc::new(MockCompletion::replying("ok"));
        let tool = LlmTool::new(completion.clone());

        tool.complete(
            &ctx,
            LlmInput { prompt: "hi".into(), model: Some("gpt-4o".into()) },
        )
        .await
        .unwrap();

        assert_eq!(billing.charges()[0].model, "gpt-4o");
        assert_eq!(completion.calls()[0].0, "gpt-4o");
    }

    #[tokio::test]
    async fn provider_failure_is_a_tool_error_and_not_billed() {
        let billing = Arc::new(RecordingBilling::default());
        let ctx = ToolContext::new("u1", None, "m", billing.clone());
        let tool = LlmTool::new(Arc::new(MockCompletion::failing("503")));

        let err = tool
            .execute(&ctx, ToolInput::Llm(LlmInput { prompt: "hi".into(), model: None }))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Provider(_)));
        assert!(billing.charges().is_empty());
    }
}
