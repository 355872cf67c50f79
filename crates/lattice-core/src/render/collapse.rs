//! Synthetic packages, collapse levels, and descendant suppression

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::id::{HierarchyLevel, IdFamily, NodeId};
use crate::lens::{Distance, DistanceRule, NodeState};

/// A node is collapsed iff its hierarchy level equals the rule's collapse
/// level; level 0 disables collapsing for the rule.
pub(crate) fn is_collapsed(level: HierarchyLevel, rule: &DistanceRule) -> bool {
    rule.collapse_level != 0 && level as u8 == rule.collapse_level
}

/// Derive package nodes from every target id (and from uncovered files,
/// which sit directly under their package). A package's distance is the
/// minimum across its descendants; a directly selected empty package
/// keeps its own root distance.
pub(crate) fn synthesize_packages(
    candidates: &BTreeSet<NodeId>,
    distances: &HashMap<NodeId, Distance>,
) -> Vec<(NodeId, Distance)> {
    let mut packages: BTreeMap<NodeId, Distance> = BTreeMap::new();
    for id in candidates {
        let Some(pkg) = id.package_id() else { continue };
        if pkg == *id {
            continue;
        }
        let dist = distances.get(id).copied().unwrap_or(Distance::Infinite);
        packages
            .entry(pkg)
            .and_modify(|d| *d = d.min(dist))
            .or_insert(dist);
    }
    for (pkg, dist) in packages.iter_mut() {
        if let Some(&own) = distances.get(pkg) {
            *dist = dist.min(own);
        }
    }
    // A selected package with no descendants still renders on its own.
    for (id, &dist) in distances {
        if id.family() == IdFamily::Package {
            packages.entry(id.clone()).or_insert(dist);
        }
    }
    packages.into_iter().collect()
}

/// The final rendered node set: visible nodes without a collapsed or
/// invisible ancestor. Iterates in id order.
pub(crate) fn kept_nodes(states: &BTreeMap<NodeId, NodeState>) -> BTreeSet<NodeId> {
    states
        .iter()
        .filter(|(id, state)| state.visible && !blocked_by_ancestor(id, states))
        .map(|(id, _)| id.clone())
        .collect()
}

fn blocked_by_ancestor(id: &NodeId, states: &BTreeMap<NodeId, NodeState>) -> bool {
    let mut current = id.clone();
    while let Some(parent) = current.parent() {
        if let Some(state) = states.get(&parent) {
            if state.collapsed || !state.visible {
                return true;
            }
        }
        current = parent;
    }
    false
}
