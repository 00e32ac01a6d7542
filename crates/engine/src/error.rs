//! Engine-level error types.

use thiserror::Error;
use tools::ToolError;

/// Errors produced by the engine (compilation, quotas, execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Structural errors: raised before any tool runs ------

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// Kahn's algorithm could not order every node.
    #[error("graph must be a DAG: cycle among nodes [{}]", .unordered.join(", "))]
    NotADag { unordered: Vec<String> },

    /// A node names a tool the registry does not know.
    #[error("node '{node_id}' uses unknown tool '{tool}'")]
    UnknownTool { node_id: String, tool: String },

    /// Neither a graph with nodes nor a goal was supplied.
    #[error("run request has neither graph nodes nor a goal")]
    EmptyRun,

    #[error("run has {requested} steps but the plan allows at most {limit} per run")]
    StepLimitExceeded { requested: usize, limit: usize },

    #[error("user already has {limit} concurrent run(s), the plan maximum")]
    ConcurrencyLimit { limit: usize },

    #[error("daily credit limit reached: {used:.4} of {limit:.4} credits used")]
    DailyCreditLimit { used: f64, limit: f64 },

    // ------ Execution errors ------

    /// A tool failed; the run is aborted at this step.
    #[error("step {index} ('{node_id}') failed: {source}")]
    StepFailed {
        index: usize,
        node_id: String,
        #[source]
        source: ToolError,
    },

    #[error("run cancelled")]
    Cancelled,

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}

impl EngineError {
    /// Structural errors fail a run before any step executes.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateNodeId(_)
                | Self::NotADag { .. }
                | Self::UnknownTool { .. }
                | Self::EmptyRun
                | Self::StepLimitExceeded { .. }
                | Self::ConcurrencyLimit { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tools::ToolName;

    #[test]
    fn dag_error_lists_unordered_nodes() {
        let err = EngineError::NotADag {
            unordered: vec!["b".into(), "c".into()],
        };
        assert_eq!(err.to_string(), "graph must be a DAG: cycle among nodes [b, c]");
        assert!(err.is_structural());
    }

    #[test]
    fn step_failure_carries_tool_message() {
        let err = EngineError::StepFailed {
            index: 1,
            node_id: "search".into(),
            source: ToolError::failed(ToolName::WebSearch, "boom"),
        };
        assert_eq!(
            err.to_string(),
            "step 1 ('search') failed: tool 'web_search' failed: boom"
        );
        assert!(!err.is_structural());
    }
}
