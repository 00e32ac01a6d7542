//! Typed input/output shapes for every tool.
//!
//! [`ToolInput`] and [`ToolOutput`] are discriminated unions keyed by
//! [`ToolName`]. Graph nodes carry free-form JSON; the registry decodes it
//! into the matching `ToolInput` variant right before dispatch, after the
//! template resolver has run over it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{ToolError, ToolName};

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanInput {
    pub goal: String,
}

/// One entry of a generated plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub tool: ToolName,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutput {
    pub steps: Vec<PlannedStep>,
}

impl PlanOutput {
    /// The planner's fallback: a single `llm` step carrying the goal verbatim.
    pub fn single_llm(goal: &str) -> Self {
        Self {
            steps: vec![PlannedStep {
                tool: ToolName::Llm,
                input: json!({ "prompt": goal }),
                note: Some("fallback: planner output unusable".into()),
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// llm
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmInput {
    pub prompt: String,
    /// Overrides the run's model for this call only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmOutput {
    pub text: String,
}

// ---------------------------------------------------------------------------
// web_search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchInput {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchOutput {
    pub results: Vec<SearchResult>,
}

// ---------------------------------------------------------------------------
// operator_exec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorExecInput {
    pub cmd: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

// ---------------------------------------------------------------------------
// rag_search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagSearchInput {
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagSearchOutput {
    pub passages: Vec<Passage>,
    pub answer: String,
}

// ---------------------------------------------------------------------------
// Unions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tool", content = "input", rename_all = "snake_case")]
pub enum ToolInput {
    Plan(PlanInput),
    Llm(LlmInput),
    WebSearch(WebSearchInput),
    OperatorExec(OperatorExecInput),
    RagSearch(RagSearchInput),
}

impl ToolInput {
    pub fn tool(&self) -> ToolName {
        match self {
            Self::Plan(_) => ToolName::Plan,
            Self::Llm(_) => ToolName::Llm,
            Self::WebSearch(_) => ToolName::WebSearch,
            Self::OperatorExec(_) => ToolName::OperatorExec,
            Self::RagSearch(_) => ToolName::RagSearch,
        }
    }

    /// Decode a step's JSON payload into the input shape of `tool`.
    ///
    /// A bare string is accepted as the tool's primary text field, so a
    /// planner step like `{"tool": "llm", "input": "summarise this"}` works.
    pub fn parse(tool: ToolName, value: Value) -> Result<Self, ToolError> {
        let value = match value {
            Value::String(text) => json!({ primary_field(tool): text }),
            other => other,
        };

        Ok(match tool {
            ToolName::Plan => Self::Plan(decode(tool, value)?),
            ToolName::Llm => Self::Llm(decode(tool, value)?),
            ToolName::WebSearch => Self::WebSearch(decode(tool, value)?),
            ToolName::OperatorExec => Self::OperatorExec(decode(tool, value)?),
            ToolName::RagSearch => Self::RagSearch(decode(tool, value)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tool", content = "output", rename_all = "snake_case")]
pub enum ToolOutput {
    Plan(PlanOutput),
    Llm(LlmOutput),
    WebSearch(WebSearchOutput),
    OperatorExec(OperatorExecOutput),
    RagSearch(RagSearchOutput),
}

impl ToolOutput {
    pub fn tool(&self) -> ToolName {
        match self {
            Self::Plan(_) => ToolName::Plan,
            Self::Llm(_) => ToolName::Llm,
            Self::WebSearch(_) => ToolName::WebSearch,
            Self::OperatorExec(_) => ToolName::OperatorExec,
            Self::RagSearch(_) => ToolName::RagSearch,
        }
    }

    /// The untagged JSON form stored as a step's `response`.
    pub fn into_value(self) -> Value {
        let encoded = match self {
            Self::Plan(o) => serde_json::to_value(o),
            Self::Llm(o) => serde_json::to_value(o),
            Self::WebSearch(o) => serde_json::to_value(o),
            Self::OperatorExec(o) => serde_json::to_value(o),
            Self::RagSearch(o) => serde_json::to_value(o),
        };
        // Plain structs of strings/numbers always encode.
        encoded.unwrap_or(Value::Null)
    }
}

fn primary_field(tool: ToolName) -> &'static str {
    match tool {
        ToolName::Plan => "goal",
        ToolName::Llm => "prompt",
        ToolName::WebSearch => "query",
        ToolName::OperatorExec => "cmd",
        ToolName::RagSearch => "question",
    }
}

fn decode<T: DeserializeOwned>(tool: ToolName, value: Value) -> Result<T, ToolError> {
    serde_json::from_value(value).map_err(|e| ToolError::InvalidInput {
        tool,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_input() {
        let input = ToolInput::parse(
            ToolName::WebSearch,
            json!({ "query": "rust dag", "provider": "tavily" }),
        )
        .unwrap();
        assert_eq!(
            input,
            ToolInput::WebSearch(WebSearchInput {
                query: "rust dag".into(),
                provider: Some("tavily".into()),
            })
        );
        assert_eq!(input.tool(), ToolName::WebSearch);
    }

    #[test]
    fn bare_string_maps_to_primary_field() {
        let input = ToolInput::parse(ToolName::OperatorExec, json!("ls -la")).unwrap();
        assert_eq!(
            input,
            ToolInput::OperatorExec(OperatorExecInput { cmd: "ls -la".into() })
        );
    }

    #[test]
    fn missing_required_field_is_invalid_input() {
        let err = ToolInput::parse(ToolName::Llm, json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { tool: ToolName::Llm, .. }));
    }

    #[test]
    fn output_value_is_untagged() {
        let out = ToolOutput::Llm(LlmOutput { text: "hi".into() });
        assert_eq!(out.tool(), ToolName::Llm);
        assert_eq!(out.into_value(), json!({ "text": "hi" }));
    }

    #[test]
    fn fallback_plan_wraps_goal_verbatim() {
        let plan = PlanOutput::single_llm("find the answer");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tool, ToolName::Llm);
        assert_eq!(plan.steps[0].input, json!({ "prompt": "find the answer" }));
    }
}
