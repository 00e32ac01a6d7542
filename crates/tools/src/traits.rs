//! The `Tool` trait and the context every tool runs in.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{ToolError, ToolInput, ToolName, ToolOutput};

/// One unit of usage reported by a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Charge {
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// What was consumed (`llm`, `web_search`, …). Flat fees are keyed on it.
    pub label: String,
    /// Model the tokens are priced against.
    pub model: String,
    pub meta: Option<Value>,
}

/// Receives every charge a tool reports and returns the credits it cost.
///
/// Synchronous and infallible: budget exhaustion is checked by the runner
/// between steps, never inside `bill`.
pub trait BillingSink: Send + Sync {
    fn bill(&self, charge: Charge) -> f64;
}

/// Shared context passed to every tool during execution.
#[derive(Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub project_id: Option<String>,
    pub model: String,
    billing: Arc<dyn BillingSink>,
}

impl ToolContext {
    pub fn new(
        user_id: impl Into<String>,
        project_id: Option<String>,
        model: impl Into<String>,
        billing: Arc<dyn BillingSink>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            project_id,
            model: model.into(),
            billing,
        }
    }

    /// Attribute usage to the current step. Returns the credits charged.
    pub fn bill(&self, tokens_in: u64, tokens_out: u64, label: &str, meta: Option<Value>) -> f64 {
        self.billing.bill(Charge {
            tokens_in,
            tokens_out,
            label: label.to_owned(),
            model: self.model.clone(),
            meta,
        })
    }

    /// Same context, priced against a different model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("user_id", &self.user_id)
            .field("project_id", &self.project_id)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// The core tool trait.
///
/// Implementations receive the input variant matching [`Tool::name`] and
/// must answer with the matching output variant.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    async fn execute(&self, ctx: &ToolContext, input: ToolInput) -> Result<ToolOutput, ToolError>;

    /// Per-invocation time limit; `None` uses the registry default.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Error for a tool handed the wrong input variant.
pub(crate) fn mismatched(tool: ToolName, input: &ToolInput) -> ToolError {
    ToolError::InvalidInput {
        tool,
        message: format!("received input for '{}'", input.tool()),
    }
}
