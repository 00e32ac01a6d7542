//! Tool-level error type.

use thiserror::Error;

use crate::ToolName;

/// Errors returned by a tool invocation.
///
/// Every variant ends up on the step record as an `error` status with the
/// rendered message; the engine never retries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolError {
    /// The step input could not be decoded into the tool's input shape.
    #[error("invalid input for '{tool}': {message}")]
    InvalidInput { tool: ToolName, message: String },

    /// No implementation is registered under this name.
    #[error("no implementation registered for tool '{0}'")]
    NotRegistered(ToolName),

    /// The invocation exceeded its time limit.
    #[error("tool '{tool}' timed out after {secs}s")]
    Timeout { tool: ToolName, secs: u64 },

    /// An external collaborator (completion, search, sandbox) failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// The tool itself failed.
    #[error("tool '{tool}' failed: {message}")]
    Failed { tool: ToolName, message: String },
}

impl ToolError {
    pub fn failed(tool: ToolName, message: impl Into<String>) -> Self {
        Self::Failed {
            tool,
            message: message.into(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }
}
