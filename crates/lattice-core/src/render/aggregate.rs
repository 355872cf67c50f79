//! Edge remapping to visible ancestors and aggregation

use std::collections::{BTreeMap, BTreeSet};

use crate::id::{HierarchyLevel, NodeId};
use crate::lens::{LensConfig, NodeState};
use crate::model::{EdgeType, FlatGraph};
use crate::render::RenderedEdge;

/// Nearest rendered ancestor of `id`, the node itself included. The walk
/// runs bottom-up, so a visible target always wins over its package.
pub fn find_visible_ancestor(id: &NodeId, kept: &BTreeSet<NodeId>) -> Option<NodeId> {
    let mut current = id.clone();
    loop {
        if kept.contains(&current) {
            return Some(current);
        }
        current = current.parent()?;
    }
}

/// Remap every module edge to rendered endpoints, normalise mixed
/// package/target pairs, aggregate by key and apply the lens's edge
/// rules. Output is ordered by (source, target, type).
pub(crate) fn aggregate_edges(
    graph: &FlatGraph,
    candidates: &BTreeSet<NodeId>,
    states: &BTreeMap<NodeId, NodeState>,
    kept: &BTreeSet<NodeId>,
    lens: &LensConfig,
) -> Vec<RenderedEdge> {
    let mut aggregated: BTreeMap<(NodeId, NodeId, EdgeType), u32> = BTreeMap::new();

    'edges: for edge in &graph.edges {
        if !candidates.contains(&edge.from) || !candidates.contains(&edge.to) {
            continue;
        }
        if !lens.edge_rules.types.contains(&edge.edge_type) {
            continue;
        }
        // The matched rule of each *original* endpoint decides whether
        // that node contributes edges at all, and of which types.
        for endpoint in [&edge.from, &edge.to] {
            let Some(state) = states.get(endpoint) else {
                continue 'edges;
            };
            let Some(rule) = state.rule.map(|i| &lens.distance_rules[i]) else {
                continue 'edges;
            };
            if !rule.show_edges {
                continue 'edges;
            }
            if let Some(allowed) = &rule.edge_types {
                if !allowed.contains(&edge.edge_type) {
                    continue 'edges;
                }
            }
        }
        let Some(src) = find_visible_ancestor(&edge.from, kept) else {
            continue;
        };
        let Some(dst) = find_visible_ancestor(&edge.to, kept) else {
            continue;
        };
        if !lens.edge_rules.aggregate_collapsed && (src != edge.from || dst != edge.to) {
            continue;
        }
        let Some((src, dst)) = normalise_levels(src, dst, kept) else {
            continue;
        };
        if src == dst {
            continue;
        }
        let rendered_type = if lens.edge_rules.collapse_edge_types {
            EdgeType::Multi
        } else {
            edge.edge_type
        };
        *aggregated.entry((src, dst, rendered_type)).or_insert(0) += 1;
    }

    let min_count = lens.edge_rules.min_count.unwrap_or(0);
    aggregated
        .into_iter()
        .filter(|(_, count)| *count >= min_count)
        .map(|((source, target, edge_type), count)| RenderedEdge {
            source,
            target,
            edge_type,
            count,
        })
        .collect()
}

/// When one endpoint is a package and the other a target, lift the
/// target to its package so both ends sit at the same hierarchy level.
/// Returns `None` when the lifted endpoint is not rendered.
fn normalise_levels(
    src: NodeId,
    dst: NodeId,
    kept: &BTreeSet<NodeId>,
) -> Option<(NodeId, NodeId)> {
    let lift = |id: &NodeId| -> Option<NodeId> {
        let pkg = id.package_id()?;
        kept.contains(&pkg).then_some(pkg)
    };
    match (src.level(), dst.level()) {
        (HierarchyLevel::Package, HierarchyLevel::Target) => {
            // System libraries have no package to lift to; leave them be.
            match lift(&dst) {
                Some(lifted) => Some((src, lifted)),
                None if dst.package_id().is_none() => Some((src, dst)),
                None => None,
            }
        }
        (HierarchyLevel::Target, HierarchyLevel::Package) => match lift(&src) {
            Some(lifted) => Some((lifted, dst)),
            None if src.package_id().is_none() => Some((src, dst)),
            None => None,
        },
        _ => Some((src, dst)),
    }
}
