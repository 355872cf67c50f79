//! The lens renderer: distance, rules, collapse, edge aggregation
//!
//! Pure over (FlatGraph, lenses, selection): no I/O, no hidden state.
//! The pipeline order is load-bearing: selection expansion, distance
//! BFS, lens assignment, rule match, visibility, synthetic packages,
//! collapse, edge aggregation, deterministic ordering.

mod aggregate;
mod collapse;
mod distance;
mod visibility;

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::id::{HierarchyLevel, NodeId};
use crate::lens::{AppliedLens, BaseSet, Distance, LensConfig, NodeState};
use crate::model::{EdgeType, FlatGraph, NodeKind};

pub use aggregate::find_visible_ancestor;

/// A full render request as carried by the lens endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderRequest {
    pub default_lens: LensConfig,
    pub detail_lens: LensConfig,
    #[serde(rename = "selectedNodes")]
    pub selected: Vec<NodeId>,
}

/// A node after lens evaluation. `parent` is the nearest rendered
/// ancestor, for client-side nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedNode {
    pub id: NodeId,
    pub label: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    pub distance: Distance,
    pub collapsed: bool,
}

/// An aggregated, typed edge between two rendered nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedEdge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// How many module edges this edge stands for.
    pub count: u32,
}

impl RenderedEdge {
    /// Stable identity used by snapshots and diffs.
    pub fn key(&self) -> String {
        format!("{}|{}|{:?}", self.source, self.target, self.edge_type)
    }
}

/// The fully resolved output of one lens evaluation, deterministically
/// ordered (nodes by id, edges by source/target/type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RenderedGraph {
    pub nodes: Vec<RenderedNode>,
    pub edges: Vec<RenderedEdge>,
}

impl RenderedGraph {
    pub fn size(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }
}

/// Evaluate a lens request against a flat graph.
pub fn render(graph: &FlatGraph, request: &RenderRequest) -> Result<RenderedGraph, RenderError> {
    request.default_lens.validate()?;
    request.detail_lens.validate()?;

    let applied = if request.selected.is_empty() {
        AppliedLens::Default
    } else {
        AppliedLens::Detail
    };
    let lens = match applied {
        AppliedLens::Default => &request.default_lens,
        AppliedLens::Detail => &request.detail_lens,
    };

    let candidates = base_candidates(graph, &lens.base_set)?;

    // 1–2. Selection expansion and distance assignment.
    let roots = distance::expand_selection(&candidates, &request.selected);
    let distances = distance::compute_distances(graph, &candidates, &roots);

    // 3–5. Rule match and visibility for every real node.
    let needed = visibility::needed_packages(graph, &candidates);
    let mut states: BTreeMap<NodeId, NodeState> = BTreeMap::new();
    for id in &candidates {
        let node = &graph.nodes[id];
        let dist = distances.get(id).copied().unwrap_or(Distance::Infinite);
        let matched = visibility::match_rule(lens, dist);
        let visible = matched
            .map(|(_, rule)| visibility::node_visible(node, rule, &lens.global_filters, &needed))
            .unwrap_or(false);
        let collapsed = matched
            .map(|(_, rule)| collapse::is_collapsed(id.level(), rule))
            .unwrap_or(false);
        states.insert(
            id.clone(),
            NodeState {
                visible,
                collapsed,
                distance: dist,
                applied_lens: applied,
                rule: matched.map(|(i, _)| i),
            },
        );
    }

    // 6. Synthetic packages with min-descendant distances.
    for (pkg_id, dist) in collapse::synthesize_packages(&candidates, &distances) {
        let matched = visibility::match_rule(lens, dist);
        let visible = matched
            .map(|(_, rule)| {
                visibility::package_visible(&pkg_id, rule, &lens.global_filters, &needed)
            })
            .unwrap_or(false);
        let collapsed = matched
            .map(|(_, rule)| collapse::is_collapsed(HierarchyLevel::Package, rule))
            .unwrap_or(false);
        states.insert(
            pkg_id,
            NodeState {
                visible,
                collapsed,
                distance: dist,
                applied_lens: applied,
                rule: matched.map(|(i, _)| i),
            },
        );
    }

    // 7. Collapse: drop everything under a collapsed or invisible ancestor.
    let kept = collapse::kept_nodes(&states);

    // 8. Edge remapping and aggregation.
    let edges = aggregate::aggregate_edges(graph, &candidates, &states, &kept, lens);

    // 9. Deterministic ordering. `kept` iterates in id order already.
    let nodes = kept
        .iter()
        .map(|id| {
            let state = &states[id];
            let (label, kind) = match graph.nodes.get(id) {
                Some(node) => (node.label.clone(), node.kind),
                // Synthetic package: not part of the flat graph.
                None => (id.as_str().to_string(), NodeKind::Package),
            };
            RenderedNode {
                id: id.clone(),
                label,
                kind,
                parent: find_visible_ancestor(&id.parent().unwrap_or_else(|| id.clone()), &kept)
                    .filter(|p| p != id),
                distance: state.distance,
                collapsed: state.collapsed,
            }
        })
        .collect();

    Ok(RenderedGraph { nodes, edges })
}

/// Narrow the graph to the lens's base set.
fn base_candidates(graph: &FlatGraph, base: &BaseSet) -> Result<BTreeSet<NodeId>, RenderError> {
    match base {
        BaseSet::FullGraph => Ok(graph.nodes.keys().cloned().collect()),
        BaseSet::ReachableFromBinary { label } => {
            let root = NodeId::new(label.clone());
            if !graph.nodes.contains_key(&root) {
                return Err(RenderError::InvalidLens(format!(
                    "reachableFromBinary: unknown target {label}"
                )));
            }
            let mut reachable: BTreeSet<NodeId> = BTreeSet::new();
            let mut frontier = vec![root.clone()];
            reachable.insert(root);
            while let Some(current) = frontier.pop() {
                for edge in graph.edges.iter().filter(|e| e.from == current) {
                    if reachable.insert(edge.to.clone()) {
                        frontier.push(edge.to.clone());
                    }
                }
            }
            // A reachable target brings its files along.
            Ok(graph
                .nodes
                .keys()
                .filter(|id| {
                    reachable.contains(*id)
                        || ancestors(id).any(|a| reachable.contains(&a))
                })
                .cloned()
                .collect())
        }
        BaseSet::PackageLevel { path } => {
            let prefix = NodeId::package(path.trim_matches('/'));
            Ok(graph
                .nodes
                .keys()
                .filter(|id| {
                    id.package_id().is_some_and(|pkg| {
                        pkg == prefix
                            || pkg
                                .as_str()
                                .starts_with(&format!("{}/", prefix.as_str()))
                    })
                })
                .cloned()
                .collect())
        }
    }
}

/// Iterate the proper ancestors of an id, nearest first.
fn ancestors(id: &NodeId) -> impl Iterator<Item = NodeId> {
    let mut current = id.clone();
    std::iter::from_fn(move || {
        let parent = current.parent()?;
        current = parent.clone();
        Some(parent)
    })
}
