//! Distance-rule matching and per-node visibility

use std::collections::BTreeSet;

use crate::id::NodeId;
use crate::lens::{Distance, DistanceRule, GlobalFilters, LensConfig};
use crate::model::{FlatGraph, Node, NodeKind};

/// First rule whose distance equals the node's, else the infinite rule,
/// else none (the node stays hidden).
pub(crate) fn match_rule(lens: &LensConfig, distance: Distance) -> Option<(usize, &DistanceRule)> {
    lens.distance_rules
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.distance == distance)
        .or_else(|| {
            lens.distance_rules
                .iter()
                .enumerate()
                .find(|(_, rule)| rule.distance == Distance::Infinite)
        })
}

/// Packages that contain any binary or shared library; the `showOnlyLdd`
/// whitelist keeps these around. Computed before any filtering.
pub(crate) fn needed_packages(graph: &FlatGraph, candidates: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
    candidates
        .iter()
        .filter_map(|id| {
            let node = graph.nodes.get(id)?;
            if matches!(node.kind, NodeKind::CcBinary | NodeKind::CcSharedLibrary) {
                id.package_id()
            } else {
                None
            }
        })
        .collect()
}

/// Whether a real node passes its matched rule and the global filters.
pub(crate) fn node_visible(
    node: &Node,
    rule: &DistanceRule,
    filters: &GlobalFilters,
    _needed: &BTreeSet<NodeId>,
) -> bool {
    if filters.show_only_ldd
        && !matches!(
            node.kind,
            NodeKind::CcBinary | NodeKind::CcSharedLibrary | NodeKind::SystemLibrary
        )
    {
        return false;
    }
    if filters.hide_external && (node.kind == NodeKind::External || node.id.is_external()) {
        return false;
    }
    if filters.hide_uncovered
        && matches!(node.kind, NodeKind::UncoveredSource | NodeKind::UncoveredHeader)
    {
        return false;
    }
    if filters.hide_system_libs && node.kind == NodeKind::SystemLibrary {
        return false;
    }

    let vis = &rule.node_visibility;
    match node.kind {
        NodeKind::CcLibrary | NodeKind::CcBinary | NodeKind::CcSharedLibrary => {
            vis.target_types.contains(&node.kind)
        }
        NodeKind::External => vis.show_external,
        NodeKind::SourceFile | NodeKind::HeaderFile => vis.file_types.allows(node.kind),
        NodeKind::UncoveredSource | NodeKind::UncoveredHeader => {
            vis.show_uncovered && vis.file_types.allows(node.kind)
        }
        NodeKind::SystemLibrary => vis.show_system_libraries,
        // Package nodes are synthetic and handled by `package_visible`.
        NodeKind::Package => false,
    }
}

/// A synthetic package is visible iff its rule allows some target kind,
/// subject to the global whitelist filters.
pub(crate) fn package_visible(
    package: &NodeId,
    rule: &DistanceRule,
    filters: &GlobalFilters,
    needed: &BTreeSet<NodeId>,
) -> bool {
    if filters.show_only_ldd && !needed.contains(package) {
        return false;
    }
    if filters.hide_external && package.is_external() {
        return false;
    }
    !rule.node_visibility.target_types.is_empty()
}
