//! Graph compilation: run this before executing a graph.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the graph.
//! 2. Edges whose endpoints are not both known are dropped (stale editor
//!    state), never rejected.
//! 3. The directed graph must be acyclic (Kahn's algorithm must order every
//!    node).
//!
//! Ties between ready nodes are broken by declaration order, so a given graph
//! always compiles to the same sequence.

use std::collections::{BTreeSet, HashMap};

use serde_json::json;
use tracing::debug;

use tools::ToolName;

use crate::models::{CompiledStep, Graph, Node};
use crate::EngineError;

/// Validate the graph and return node IDs in execution order.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::NotADag`] if the graph contains a cycle.
pub fn topological_order(graph: &Graph) -> Result<Vec<String>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Index nodes by position, rejecting duplicates
    // -----------------------------------------------------------------------
    let mut position: HashMap<&str, usize> = HashMap::with_capacity(graph.nodes.len());
    for (idx, node) in graph.nodes.iter().enumerate() {
        if position.insert(node.id.as_str(), idx).is_some() {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Build adjacency and in-degree over surviving edges
    // -----------------------------------------------------------------------
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; graph.nodes.len()];

    for edge in &graph.edges {
        match (
            position.get(edge.source.as_str()),
            position.get(edge.target.as_str()),
        ) {
            (Some(&from), Some(&to)) => {
                adjacency[from].push(to);
                in_degree[to] += 1;
            }
            _ => debug!(
                source = %edge.source,
                target = %edge.target,
                "dropping edge with unknown endpoint"
            ),
        }
    }

    // -----------------------------------------------------------------------
    // 3. Kahn's algorithm, lowest declaration index first
    // -----------------------------------------------------------------------
    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(idx, _)| idx)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(graph.nodes.len());

    while let Some(idx) = ready.pop_first() {
        sorted.push(graph.nodes[idx].id.clone());

        for &next in &adjacency[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if sorted.len() != graph.nodes.len() {
        let unordered = graph
            .nodes
            .iter()
            .enumerate()
            .filter(|(idx, _)| in_degree[*idx] > 0)
            .map(|(_, node)| node.id.clone())
            .collect();
        return Err(EngineError::NotADag { unordered });
    }

    Ok(sorted)
}

/// Order the graph and resolve each node's tool and input.
///
/// # Errors
/// Everything [`topological_order`] rejects, plus
/// [`EngineError::UnknownTool`] for a node naming a tool that does not exist.
pub fn compile(graph: &Graph) -> Result<Vec<CompiledStep>, EngineError> {
    let order = topological_order(graph)?;
    let by_id: HashMap<&str, &Node> = graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let steps = order
        .into_iter()
        .map(|node_id| {
            let node = by_id[node_id.as_str()];
            let tool = resolve_tool(node)?;
            let input = node.data.input.clone().unwrap_or_else(|| json!({}));
            Ok(CompiledStep {
                node_id,
                tool,
                input,
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    debug!(
        steps = steps.len(),
        order = ?steps.iter().map(|s| s.node_id.as_str()).collect::<Vec<_>>(),
        "graph compiled"
    );
    Ok(steps)
}

/// Explicit `tool`, else the label, else `llm`.
fn resolve_tool(node: &Node) -> Result<ToolName, EngineError> {
    let declared = non_blank(&node.data.tool).or_else(|| non_blank(&node.data.label));

    match declared {
        None => Ok(ToolName::DEFAULT),
        Some(name) => name.parse().map_err(|_| EngineError::UnknownTool {
            node_id: node.id.clone(),
            tool: name.to_owned(),
        }),
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
