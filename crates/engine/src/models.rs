//! Core domain models for the engine.
//!
//! `Graph`, `Node` and `Edge` arrive from outside (the graph editor's JSON)
//! and are read-only here. `Run` and `Step` are created and owned by the
//! runner for the duration of one execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use db::{RunRecord, StepRecord};
use tools::ToolName;

pub use db::{RunStatus, StepStatus};

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Editor-supplied payload of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Explicit tool name. Wins over `label`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Display label; doubles as the tool name when `tool` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

/// One declared unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique within the graph; referenced by edges and placeholders.
    pub id: String,
    #[serde(default)]
    pub data: NodeData,
}

impl Node {
    pub fn new(id: impl Into<String>, tool: ToolName, input: Value) -> Self {
        Self {
            id: id.into(),
            data: NodeData {
                tool: Some(tool.as_str().to_owned()),
                label: None,
                input: Some(input),
            },
        }
    }

    /// A node whose tool is inferred from its label.
    pub fn labelled(id: impl Into<String>, label: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            data: NodeData {
                tool: None,
                label: Some(label.into()),
                input: Some(input),
            },
        }
    }
}

/// Directed dependency: `target` consumes `source`'s output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A node ready for dispatch, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStep {
    pub node_id: String,
    pub tool: ToolName,
    pub input: Value,
}

// ---------------------------------------------------------------------------
// Run / Step
// ---------------------------------------------------------------------------

/// How a run's steps were produced. Chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Steps compiled from a node/edge graph.
    Graph,
    /// Steps produced by the planner from a free-text goal.
    Linear,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Linear => "linear",
        }
    }
}

/// Token and credit totals for one step (or a whole run).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub credits: f64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.tokens_in += other.tokens_in;
        self.tokens_out += other.tokens_out;
        self.credits += other.credits;
    }
}

/// Runtime record of one executed (or attempted) step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub index: usize,
    pub node_id: String,
    pub tool: ToolName,
    pub status: StepStatus,
    /// Input after template resolution.
    pub request: Value,
    pub response: Option<Value>,
    pub error: Option<String>,
    pub usage: Usage,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Step {
    pub(crate) fn start(index: usize, node_id: &str, tool: ToolName, request: Value) -> Self {
        Self {
            index,
            node_id: node_id.to_owned(),
            tool,
            status: StepStatus::Running,
            request,
            response: None,
            error: None,
            usage: Usage::default(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn complete(&mut self, response: Value, usage: Usage) {
        self.status = StepStatus::Done;
        self.response = Some(response);
        self.usage = usage;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: String, usage: Usage) {
        self.status = StepStatus::Error;
        self.error = Some(error);
        self.usage = usage;
        self.finished_at = Some(Utc::now());
    }

    pub fn to_record(&self, run_id: Uuid) -> StepRecord {
        StepRecord {
            run_id,
            index: self.index,
            node_id: self.node_id.clone(),
            tool: self.tool.as_str().to_owned(),
            status: self.status,
            request: self.request.clone(),
            response: self.response.clone(),
            error: self.error.clone(),
            credits: self.usage.credits,
            tokens_in: self.usage.tokens_in,
            tokens_out: self.usage.tokens_out,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// One execution of a graph or of a planned goal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    pub id: Uuid,
    pub user_id: String,
    pub project_id: Option<String>,
    pub mode: RunMode,
    pub goal: Option<String>,
    pub status: RunStatus,
    pub usage: Usage,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error: Option<String>,
    /// Finalized steps, in execution order.
    pub steps: Vec<Step>,
}

impl Run {
    pub(crate) fn new(
        user_id: &str,
        project_id: Option<String>,
        mode: RunMode,
        goal: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_owned(),
            project_id,
            mode,
            goal,
            status: RunStatus::Pending,
            usage: Usage::default(),
            started_at: Utc::now(),
            finished_at: None,
            output: None,
            error: None,
            steps: Vec::new(),
        }
    }

    pub(crate) fn start(&mut self) {
        if self.status == RunStatus::Pending {
            self.status = RunStatus::Running;
        }
    }

    /// Move to the terminal state. Only the first call has any effect.
    pub(crate) fn finish(&mut self, output: Option<Value>, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        self.output = output;
        self.error = error;
        self.finished_at = Some(Utc::now());
        true
    }

    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            id: self.id,
            user_id: self.user_id.clone(),
            project_id: self.project_id.clone(),
            mode: self.mode.as_str().to_owned(),
            goal: self.goal.clone(),
            status: self.status,
            tokens_in: self.usage.tokens_in,
            tokens_out: self.usage.tokens_out,
            credits: self.usage.credits,
            output: self.output.clone(),
            error: self.error.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}
