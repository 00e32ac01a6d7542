//! Closed set of tool identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every tool the registry knows about.
///
/// Graph nodes name their tool as a string; it is parsed into this enum at
/// graph-compile time, so an unknown name never reaches dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    Plan,
    Llm,
    WebSearch,
    OperatorExec,
    RagSearch,
}

/// Returned when a string does not name a known tool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tool '{0}'")]
pub struct UnknownToolName(pub String);

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::Plan,
        ToolName::Llm,
        ToolName::WebSearch,
        ToolName::OperatorExec,
        ToolName::RagSearch,
    ];

    /// Tool used when a node declares neither a tool nor a label.
    pub const DEFAULT: ToolName = ToolName::Llm;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Llm => "llm",
            Self::WebSearch => "web_search",
            Self::OperatorExec => "operator_exec",
            Self::RagSearch => "rag_search",
        }
    }

    /// Tools the planner is allowed to emit (everything except itself).
    pub fn plannable() -> impl Iterator<Item = ToolName> {
        Self::ALL.into_iter().filter(|t| *t != ToolName::Plan)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = UnknownToolName;

    /// Case-insensitive; spaces and hyphens count as underscores, so a node
    /// labelled `Web Search` resolves to `web_search`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();

        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalised)
            .ok_or_else(|| UnknownToolName(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_names() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>(), Ok(tool));
        }
    }

    #[test]
    fn parses_label_style_names() {
        assert_eq!("Web Search".parse(), Ok(ToolName::WebSearch));
        assert_eq!("  LLM ".parse(), Ok(ToolName::Llm));
        assert_eq!("rag-search".parse(), Ok(ToolName::RagSearch));
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(
            "summarize".parse::<ToolName>(),
            Err(UnknownToolName("summarize".into()))
        );
    }

    #[test]
    fn serde_uses_snake_case() {
        let v = serde_json::to_value(ToolName::OperatorExec).unwrap();
        assert_eq!(v, "operator_exec");
    }

    #[test]
    fn planner_cannot_plan_itself() {
        assert!(ToolName::plannable().all(|t| t != ToolName::Plan));
        assert_eq!(ToolName::plannable().count(), 4);
    }
}
