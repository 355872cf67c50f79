//! Snapshot indexing and add/remove/modify diffs between renders

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::render::{RenderedEdge, RenderedGraph, RenderedNode};

/// A rendered graph indexed by node id and edge key for O(1) lookups.
pub struct GraphSnapshot<'a> {
    nodes: BTreeMap<&'a NodeId, &'a RenderedNode>,
    edges: BTreeMap<String, &'a RenderedEdge>,
}

impl<'a> GraphSnapshot<'a> {
    pub fn index(graph: &'a RenderedGraph) -> Self {
        GraphSnapshot {
            nodes: graph.nodes.iter().map(|n| (&n.id, n)).collect(),
            edges: graph.edges.iter().map(|e| (e.key(), e)).collect(),
        }
    }
}

/// What changed between two renders of the same request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphDiff {
    pub added_nodes: Vec<RenderedNode>,
    pub removed_node_ids: Vec<NodeId>,
    pub modified_nodes: Vec<RenderedNode>,
    pub added_edges: Vec<RenderedEdge>,
    pub removed_edge_keys: Vec<String>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    pub fn change_count(&self) -> usize {
        self.added_nodes.len()
            + self.removed_node_ids.len()
            + self.modified_nodes.len()
            + self.added_edges.len()
            + self.removed_edge_keys.len()
    }
}

/// Identity comparison for the modify set: computed values (distance,
/// collapse) are excluded so layout churn never counts as a change.
fn nodes_equal(a: &RenderedNode, b: &RenderedNode) -> bool {
    a.id == b.id && a.label == b.label && a.kind == b.kind && a.parent == b.parent
}

/// Diff two renders. Output vectors keep the current graph's ordering.
pub fn compute_diff(previous: &RenderedGraph, current: &RenderedGraph) -> GraphDiff {
    let prev = GraphSnapshot::index(previous);
    let curr = GraphSnapshot::index(current);

    let mut diff = GraphDiff::default();
    for node in &current.nodes {
        match prev.nodes.get(&node.id) {
            None => diff.added_nodes.push(node.clone()),
            Some(old) if !nodes_equal(old, node) => diff.modified_nodes.push(node.clone()),
            Some(_) => {}
        }
    }
    for node in &previous.nodes {
        if !curr.nodes.contains_key(&node.id) {
            diff.removed_node_ids.push(node.id.clone());
        }
    }
    for edge in &current.edges {
        if !prev.edges.contains_key(&edge.key()) {
            diff.added_edges.push(edge.clone());
        }
    }
    for edge in &previous.edges {
        let key = edge.key();
        if !curr.edges.contains_key(&key) {
            diff.removed_edge_keys.push(key);
        }
    }
    diff
}

/// One of `fullGraph` or `diff` is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LensResponse {
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_graph: Option<RenderedGraph>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<GraphDiff>,
}

/// Assemble the response for a render: a diff when the client's previous
/// graph is known and the change ratio stays under one half, otherwise
/// the full graph.
pub fn respond(
    previous: Option<&RenderedGraph>,
    current: &RenderedGraph,
    hash: String,
) -> LensResponse {
    if let Some(previous) = previous {
        let diff = compute_diff(previous, current);
        let size = current.size().max(1);
        if (diff.change_count() as f64) / (size as f64) < 0.5 {
            return LensResponse {
                hash,
                full_graph: None,
                diff: Some(diff),
            };
        }
    }
    LensResponse {
        hash,
        full_graph: Some(current.clone()),
        diff: None,
    }
}
