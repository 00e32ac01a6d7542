use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::builtin::LlmTool;
use crate::io::{LlmInput, Passage, RagSearchInput, RagSearchOutput};
use crate::providers::PassageRetriever;
use crate::traits::mismatched;
use crate::{Tool, ToolContext, ToolError, ToolInput, ToolName, ToolOutput};

/// Retrieval-augmented question answering.
///
/// Retrieval failures degrade to an empty passage list; the answer itself
/// comes from [`LlmTool`] and is billed as an `llm` charge.
pub struct RagSearchTool {
    retriever: Arc<dyn PassageRetriever>,
    llm: Arc<LlmTool>,
}

impl RagSearchTool {
    pub fn new(retriever: Arc<dyn PassageRetriever>, llm: Arc<LlmTool>) -> Self {
        Self { retriever, llm }
    }

    pub async fn answer(
        &self,
        ctx: &ToolContext,
        input: RagSearchInput,
    ) -> Result<RagSearchOutput, ToolError> {
        let passages = self
            .retriever
            .retrieve(&input.question)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "passage retrieval failed, answering without context");
                Vec::new()
            });

        let prompt = answer_prompt(&input.question, &passages);
        let answer = self
            .llm
            .complete(ctx, LlmInput { prompt, model: None })
            .await?
            .text;

        Ok(RagSearchOutput { passages, answer })
    }
}

#[async_trait]
impl Tool for RagSearchTool {
    fn name(&self) -> ToolName {
        ToolName::RagSearch
    }

    async fn execute(&self, ctx: &ToolContext, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let ToolInput::RagSearch(input) = input else {
            return Err(mismatched(self.name(), &input));
        };
        self.answer(ctx, input).await.map(ToolOutput::RagSearch)
    }
}

fn answer_prompt(question: &str, passages: &[Passage]) -> String {
    if passages.is_empty() {
        return format!("Answer the question.\n\nQuestion: {question}");
    }

    let context = passages
        .iter()
        .enumerate()
        .map(|(i, p)| match &p.source {
            Some(source) => format!("[{}] ({}) {}", i + 1, source, p.text),
            None => format!("[{}] {}", i + 1, p.text),
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Answer the question using the passages below. Cite passages by number.\n\n\
         Passages:\n{context}\n\nQuestion: {question}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCompletion, MockRetriever, RecordingBilling};
    use crate::providers::NoRetriever;

    #[tokio::test]
    async fn answers_with_empty_passages_when_retriever_has_none() {
        let billing = Arc::new(RecordingBilling::default());
        let ctx = ToolContext::new("u1", None, "m", billing.clone());
        let llm = Arc::new(LlmTool::new(Arc::new(MockCompletion::replying("42"))));
        let tool = RagSearchTool::new(Arc::new(NoRetriever), llm);

        let out = tool
            .answer(&ctx, RagSearchInput { question: "meaning of life?".into() })
            .await
            .unwrap();

        assert!(out.passages.is_empty());
        assert_eq!(out.answer, "42");
        assert_eq!(billing.charges()[0].label, "llm");
    }

    #[tokio::test]
    async fn passages_are_numbered_into_the_prompt() {
        let completion = Arc::new(MockCompletion::replying("answer"));
        let llm = Arc::new(LlmTool::new(completion.clone()));
        let retriever = MockRetriever::returning(vec![
            Passage { text: "first".into(), source: Some("doc-a".into()) },
            Passage { text: "second".into(), source: None },
        ]);
        let tool = RagSearchTool::new(Arc::new(retriever), llm);
        let ctx = ToolContext::new("u1", None, "m", Arc::new(RecordingBilling::default()));

        let out = tool
            .answer(&ctx, RagSearchInput { question: "q".into() })
            .await
            .unwrap();

        assert_eq!(out.passages.len(), 2);
        let prompt = &completion.calls()[0].1;
        assert!(prompt.contains("[1] (doc-a) first"));
        assert!(prompt.contains("[2] second"));
    }

    #[tokio::test]
    async fn retriever_failure_degrades_to_no_passages() {
        let llm = Arc::new(LlmTool::new(Arc::new(MockCompletion::replying("guess"))));
        let tool = RagSearchTool::new(Arc::new(MockRetriever::failing("index offline")), llm);
        let ctx = ToolContext::new("u1", None, "m", Arc::new(RecordingBilling::default()));

        let out = tool
            .answer(&ctx, RagSearchInput { question: "q".into() })
            .await
            .unwrap();
        assert!(out.passages.is_empty());
        assert_eq!(out.answer, "guess");
    }
}
