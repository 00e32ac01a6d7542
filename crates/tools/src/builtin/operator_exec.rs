use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::io::{OperatorExecInput, OperatorExecOutput};
use crate::providers::Sandbox;
use crate::traits::mismatched;
use crate::usage::estimate_tokens;
use crate::{Tool, ToolContext, ToolError, ToolInput, ToolName, ToolOutput};

/// Command execution through the configured [`Sandbox`].
pub struct OperatorExecTool {
    sandbox: Arc<dyn Sandbox>,
}

impl OperatorExecTool {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }

    pub async fn run(
        &self,
        ctx: &ToolContext,
        input: OperatorExecInput,
    ) -> Result<OperatorExecOutput, ToolError> {
        let output = self.sandbox.exec(&input.cmd).await?;

        ctx.bill(
            estimate_tokens(&input.cmd),
            estimate_tokens(&output.stdout) + estimate_tokens(&output.stderr),
            ToolName::OperatorExec.as_str(),
            Some(json!({ "returncode": output.returncode })),
        );

        Ok(output)
    }
}

#[async_trait]
impl Tool for OperatorExecTool {
    fn name(&self) -> ToolName {
        ToolName::OperatorExec
    }

    async fn execute(&self, ctx: &ToolContext, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let ToolInput::OperatorExec(input) = input else {
            return Err(mismatched(self.name(), &input));
        };
        self.run(ctx, input).await.map(ToolOutput::OperatorExec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockSandbox, RecordingBilling};
    use crate::providers::DisabledSandbox;

    #[tokio::test]
    async fn passes_sandbox_output_through_and_bills_it() {
        let billing = Arc::new(RecordingBilling::default());
        let ctx = ToolContext::new("u1", None, "m", billing.clone());
        let result = OperatorExecOutput {
            stdout: "a.txt\nb.txt\n".into(),
            stderr: "warn".into(),
            returncode: 3,
        };
        let tool = OperatorExecTool::new(Arc::new(MockSandbox {
            output: result.clone(),
        }));

        let output = tool
            .execute(&ctx, ToolInput::OperatorExec(OperatorExecInput { cmd: "ls -la".into() }))
            .await
            .unwrap();
        assert_eq!(output, ToolOutput::OperatorExec(result));

        let charges = billing.charges();
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].label, "operator_exec");
        assert_eq!(charges[0].tokens_in, 2);
        assert_eq!(charges[0].tokens_out, 4);
        assert_eq!(charges[0].meta, Some(json!({ "returncode": 3 })));
    }

    #[tokio::test]
    async fn sandbox_refusal_is_a_tool_error() {
        let billing = Arc::new(RecordingBilling::default());
        let ctx = ToolContext::new("u1", None, "m", billing.clone());
        let tool = OperatorExecTool::new(Arc::new(DisabledSandbox));

        let err = tool
            .run(&ctx, OperatorExecInput { cmd: "rm -rf /".into() })
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Provider(_)));
        assert!(billing.charges().is_empty());
    }

    #[tokio::test]
    async fn wrong_variant_is_rejected() {
        let ctx = ToolContext::new("u1", None, "m", Arc::new(RecordingBilling::default()));
        let tool = OperatorExecTool::new(Arc::new(DisabledSandbox));

        let err = tool
            .execute(
                &ctx,
                ToolInput::RagSearch(crate::io::RagSearchInput { question: "q".into() }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::InvalidInput { tool: ToolName::OperatorExec, .. }));
    }
}
