//! Human-readable run reports.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Graph, Run, RunMode, RunStatus, StepStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryHeader {
    pub run_id: Uuid,
    pub user_id: String,
    pub project_id: Option<String>,
    pub mode: RunMode,
    pub status: RunStatus,
    pub steps: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub credits: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

/// One row of the step table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRow {
    pub index: usize,
    pub node_id: String,
    pub tool: String,
    pub status: StepStatus,
    pub credits: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Pretty-printed request and outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDetail {
    pub index: usize,
    pub node_id: String,
    pub request: String,
    pub response: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub header: SummaryHeader,
    pub ledger: Vec<LedgerRow>,
    pub details: Vec<StepDetail>,
    /// Mermaid flowchart of the originating graph, if there was one.
    pub diagram: Option<String>,
    pub output: Option<String>,
}

impl RunSummary {
    pub fn compose(run: &Run, graph: Option<&Graph>) -> Self {
        let header = SummaryHeader {
            run_id: run.id,
            user_id: run.user_id.clone(),
            project_id: run.project_id.clone(),
            mode: run.mode,
            status: run.status,
            steps: run.steps.len(),
            tokens_in: run.usage.tokens_in,
            tokens_out: run.usage.tokens_out,
            credits: run.usage.credits,
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_ms: run
                .finished_at
                .map(|end| (end - run.started_at).num_milliseconds()),
            error: run.error.clone(),
        };

        let ledger = run
            .steps
            .iter()
            .map(|s| LedgerRow {
                index: s.index,
                node_id: s.node_id.clone(),
                tool: s.tool.to_string(),
                status: s.status,
                credits: s.usage.credits,
                tokens_in: s.usage.tokens_in,
                tokens_out: s.usage.tokens_out,
            })
            .collect();

        let details = run
            .steps
            .iter()
            .map(|s| StepDetail {
                index: s.index,
                node_id: s.node_id.clone(),
                request: pretty(&s.request),
                response: s.response.as_ref().map(pretty),
                error: s.error.clone(),
            })
            .collect();

        let diagram = graph.filter(|g| !g.is_empty()).map(|g| {
            let statuses: HashMap<&str, StepStatus> = run
                .steps
                .iter()
                .map(|s| (s.node_id.as_str(), s.status))
                .collect();
            mermaid_diagram(g, &statuses)
        });

        Self {
            header,
            ledger,
            details,
            diagram,
            output: run.output.as_ref().map(pretty),
        }
    }

    pub fn render_markdown(&self) -> String {
        let h = &self.header;
        let mut out = String::new();

        let _ = writeln!(out, "# Run {}\n", h.run_id);
        let _ = writeln!(out, "- **Status:** {}", h.status);
        let _ = writeln!(out, "- **Mode:** {}", h.mode.as_str());
        let _ = writeln!(out, "- **User:** {}", h.user_id);
        if let Some(project) = &h.project_id {
            let _ = writeln!(out, "- **Project:** {project}");
        }
        let _ = writeln!(out, "- **Steps:** {}", h.steps);
        let _ = writeln!(
            out,
            "- **Tokens:** {} in / {} out",
            h.tokens_in, h.tokens_out
        );
        let _ = writeln!(out, "- **Credits:** {:.4}", h.credits);
        let _ = writeln!(out, "- **Started:** {}", h.started_at.to_rfc3339());
        if let Some(finished) = h.finished_at {
            let _ = writeln!(out, "- **Finished:** {}", finished.to_rfc3339());
        }
        if let Some(ms) = h.duration_ms {
            let _ = writeln!(out, "- **Duration:** {ms} ms");
        }
        if let Some(error) = &h.error {
            let _ = writeln!(out, "- **Error:** {error}");
        }

        out.push_str("\n## Steps\n\n");
        if self.ledger.is_empty() {
            out.push_str("_No steps were executed._\n");
        } else {
            out.push_str("| # | Node | Tool | Status | Credits | Tokens in | Tokens out |\n");
            out.push_str("|---|------|------|--------|---------|-----------|------------|\n");
            for row in &self.ledger {
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} | {:.4} | {} | {} |",
                    row.index,
                    escape_cell(&row.node_id),
                    row.tool,
                    row.status,
                    row.credits,
                    row.tokens_in,
                    row.tokens_out
                );
            }
        }

        for detail in &self.details {
            let _ = writeln!(out, "\n### Step {} · {}\n", detail.index, detail.node_id);
            let _ = writeln!(out, "**Request**\n\n```json\n{}\n```", detail.request);
            if let Some(response) = &detail.response {
                let _ = writeln!(out, "\n**Response**\n\n```json\n{response}\n```");
            }
            if let Some(error) = &detail.error {
                let _ = writeln!(out, "\n**Error:** {error}");
            }
        }

        if let Some(diagram) = &self.diagram {
            let _ = writeln!(out, "\n## Graph\n\n```mermaid\n{diagram}```");
        }

        if let Some(output) = &self.output {
            let _ = writeln!(out, "\n## Output\n\n```json\n{output}\n```");
        }

        out
    }
}

/// Mermaid flowchart: one box per node labelled with its label or tool,
/// one arrow per edge between known nodes. Executed nodes are classed by
/// step status.
pub fn mermaid_diagram(graph: &Graph, statuses: &HashMap<&str, StepStatus>) -> String {
    let mut out = String::from("flowchart TD\n");
    let mut ids: HashMap<&str, String> = HashMap::with_capacity(graph.nodes.len());
    let mut seen = HashSet::new();

    for (i, node) in graph.nodes.iter().enumerate() {
        if !seen.insert(node.id.as_str()) {
            continue;
        }
        let key = format!("n{i}");
        let text = node
            .data
            .label
            .as_deref()
            .or(node.data.tool.as_deref())
            .unwrap_or("llm");
        let _ = write!(out, "    {key}[\"{}<br/>{}\"]", escape_label(&node.id), escape_label(text));
        match statuses.get(node.id.as_str()) {
            Some(StepStatus::Done) => out.push_str(":::done"),
            Some(StepStatus::Error) => out.push_str(":::error"),
            Some(StepStatus::Running) | None => {}
        }
        out.push('\n');
        ids.insert(node.id.as_str(), key);
    }

    for edge in &graph.edges {
        if let (Some(from), Some(to)) = (ids.get(edge.source.as_str()), ids.get(edge.target.as_str())) {
            let _ = writeln!(out, "    {from} --> {to}");
        }
    }

    out.push_str("    classDef done fill:#d4f7dc,stroke:#2e7d32\n");
    out.push_str("    classDef error fill:#fde0e0,stroke:#c62828\n");
    out
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn escape_label(text: &str) -> String {
    text.replace('"', "#quot;")
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, Node, Step, Usage};
    use serde_json::json;
    use tools::ToolName;

    #[test]
    fn zero_steps_renders() {
        let mut run = Run::new("u1", None, RunMode::Linear, Some("goal".into()));
        run.finish(None, Some("run has neither graph nodes nor a goal".into()));

        let summary = RunSummary::compose(&run, None);
        assert!(summary.ledger.is_empty());
        assert!(summary.diagram.is_none());

        let md = summary.render_markdown();
        assert!(md.contains("_No steps were executed._"));
        assert!(md.contains("**Error:** run has neither"));
    }

    #[test]
    fn errored_final_step_renders() {
        let mut run = Run::new("u1", Some("p1".into()), RunMode::Graph, None);
        let mut step = Step::start(0, "a|b", ToolName::WebSearch, json!({ "query": "q" }));
        step.fail(
            "tool 'web_search' failed: boom".into(),
            Usage { tokens_in: 10, tokens_out: 0, credits: 0.5 },
        );
        run.usage.add(step.usage);
        run.steps.push(step);
        run.finish(None, Some("step 0 failed".into()));

        let summary = RunSummary::compose(&run, None);
        assert_eq!(summary.ledger[0].status, StepStatus::Error);
        assert_eq!(summary.details[0].response, None);

        let md = summary.render_markdown();
        assert!(md.contains("| 0 | a\\|b | web_search | error | 0.5000 | 10 | 0 |"));
        assert!(md.contains("**Error:** tool 'web_search' failed: boom"));
        assert!(md.contains("**Project:** p1"));
        assert!(!md.contains("## Output"));
    }

    #[test]
    fn diagram_omits_dangling_edges_and_marks_status() {
        let graph = Graph::new(
            vec![
                Node::new("search", ToolName::WebSearch, json!({})),
                Node::labelled("write", "LLM \"writer\"", json!({})),
            ],
            vec![Edge::new("search", "write"), Edge::new("write", "ghost")],
        );
        let statuses = HashMap::from([("search", StepStatus::Done)]);

        let diagram = mermaid_diagram(&graph, &statuses);
        assert!(diagram.starts_with("flowchart TD\n"));
        assert!(diagram.contains("n0[\"search<br/>web_search\"]:::done"));
        assert!(diagram.contains("n1[\"write<br/>LLM #quot;writer#quot;\"]\n"));
        assert!(diagram.contains("n0 --> n1"));
        assert_eq!(diagram.matches("-->").count(), 1);
    }
}
