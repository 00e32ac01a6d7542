//! The planner: decomposes a free-text goal into a short list of tool steps.
//!
//! The planner never fails. Anything it cannot turn into a valid plan
//! (provider error, non-JSON reply, unknown tool names, an empty list)
//! degrades to [`PlanOutput::single_llm`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::io::{PlanInput, PlanOutput, PlannedStep};
use crate::providers::CompletionProvider;
use crate::traits::mismatched;
use crate::usage::estimate_tokens;
use crate::{Tool, ToolContext, ToolError, ToolInput, ToolName, ToolOutput};

pub struct PlanTool {
    completion: Arc<dyn CompletionProvider>,
}

impl PlanTool {
    pub fn new(completion: Arc<dyn CompletionProvider>) -> Self {
        Self { completion }
    }

    pub async fn plan(&self, ctx: &ToolContext, input: PlanInput) -> PlanOutput {
        let prompt = planning_prompt(&input.goal);

        let reply = match self.completion.complete(&ctx.model, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "planner completion failed, using single-step fallback");
                return PlanOutput::single_llm(&input.goal);
            }
        };

        ctx.bill(
            estimate_tokens(&prompt),
            estimate_tokens(&reply),
            ToolName::Plan.as_str(),
            None,
        );

        match parse_plan(&reply) {
            Some(steps) => {
                debug!(steps = steps.len(), "planner produced plan");
                PlanOutput { steps }
            }
            None => {
                warn!("planner output malformed, using single-step fallback");
                PlanOutput::single_llm(&input.goal)
            }
        }
    }
}

#[async_trait]
impl Tool for PlanTool {
    fn name(&self) -> ToolName {
        ToolName::Plan
    }

    async fn execute(&self, ctx: &ToolContext, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let ToolInput::Plan(input) = input else {
            return Err(mismatched(self.name(), &input));
        };
        Ok(ToolOutput::Plan(self.plan(ctx, input).await))
    }
}

fn planning_prompt(goal: &str) -> String {
    let tools = ToolName::plannable()
        .map(ToolName::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Break the following goal into 2 to 6 sequential steps.\n\
         Each step must use exactly one of these tools: {tools}.\n\
         Inputs: llm {{\"prompt\"}}, web_search {{\"query\"}}, \
         operator_exec {{\"cmd\"}}, rag_search {{\"question\"}}.\n\
         A step may reference the previous step's output with {{{{step:prev.<field>}}}}.\n\
         Reply with ONLY a JSON array of objects: \
         [{{\"tool\": \"...\", \"input\": {{...}}, \"note\": \"...\"}}]\n\n\
         Goal: {goal}"
    )
}

#[derive(Deserialize)]
struct RawStep {
    tool: String,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Deserialize)]
struct RawPlan {
    steps: Vec<RawStep>,
}

/// Parse a planner reply. Accepts a bare array, `{"steps": [...]}`, or
/// either of those wrapped in prose / code fences.
fn parse_plan(reply: &str) -> Option<Vec<PlannedStep>> {
    let raw = serde_json::from_str::<RawPlan>(reply.trim())
        .map(|p| p.steps)
        .ok()
        .or_else(|| {
            let start = reply.find('[')?;
            let end = reply.rfind(']')?;
            if end <= start {
                return None;
            }
            serde_json::from_str::<Vec<RawStep>>(&reply[start..=end]).ok()
        })?;

    if raw.is_empty() {
        return None;
    }

    raw.into_iter()
        .map(|step| {
            let tool: ToolName = step.tool.parse().ok()?;
            if tool == ToolName::Plan {
                return None;
            }
            Some(PlannedStep {
                tool,
                input: step.input,
                note: step.note,
            })
        })
        .collect()
}
