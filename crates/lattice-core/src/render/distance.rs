//! Selection expansion and undirected distance assignment

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::id::{IdFamily, NodeId};
use crate::lens::Distance;
use crate::model::FlatGraph;

/// Expand the selection: a selected package becomes the targets and
/// uncovered files inside it, or stays itself when it has no descendants.
/// Selected ids outside the candidate set are ignored.
pub(crate) fn expand_selection(
    candidates: &BTreeSet<NodeId>,
    selected: &[NodeId],
) -> BTreeSet<NodeId> {
    let mut roots = BTreeSet::new();
    for sel in selected {
        if sel.family() != IdFamily::Package {
            if candidates.contains(sel) {
                roots.insert(sel.clone());
            }
            continue;
        }
        let mut found = false;
        for id in candidates {
            let inside = match id.family() {
                IdFamily::Target => id.package_id().as_ref() == Some(sel),
                IdFamily::UncoveredFile => id.parent().as_ref() == Some(sel),
                _ => false,
            };
            if inside {
                roots.insert(id.clone());
                found = true;
            }
        }
        if !found {
            roots.insert(sel.clone());
        }
    }
    roots
}

/// Breadth-first distances treating every edge as undirected. Unreached
/// nodes inherit the nearest ancestor's distance; the rest are infinite.
pub(crate) fn compute_distances(
    graph: &FlatGraph,
    candidates: &BTreeSet<NodeId>,
    roots: &BTreeSet<NodeId>,
) -> HashMap<NodeId, Distance> {
    let mut assigned: HashMap<NodeId, u32> = HashMap::new();
    if !roots.is_empty() {
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for root in roots {
            assigned.insert(root.clone(), 0);
            queue.push_back(root.clone());
        }

        let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for edge in &graph.edges {
            if candidates.contains(&edge.from) && candidates.contains(&edge.to) {
                adjacency.entry(&edge.from).or_default().push(&edge.to);
                adjacency.entry(&edge.to).or_default().push(&edge.from);
            }
        }

        while let Some(current) = queue.pop_front() {
            let next = assigned[&current] + 1;
            let Some(neighbours) = adjacency.get(&current) else {
                continue;
            };
            for &neighbour in neighbours {
                if !assigned.contains_key(neighbour) {
                    assigned.insert(neighbour.clone(), next);
                    queue.push_back(neighbour.clone());
                }
            }
        }
    }

    let mut out: HashMap<NodeId, Distance> = HashMap::new();
    for id in candidates {
        let dist = match assigned.get(id) {
            Some(&d) => Distance::Finite(d),
            None => inherit(id, &assigned),
        };
        out.insert(id.clone(), dist);
    }
    // Roots that are not graph nodes (a selected empty package) still
    // carry distance 0 for the synthetic-package pass.
    for root in roots {
        out.entry(root.clone())
            .or_insert(Distance::Finite(assigned[root]));
    }
    out
}

/// Walk ancestors until one carries an assigned distance.
fn inherit(id: &NodeId, assigned: &HashMap<NodeId, u32>) -> Distance {
    let mut current = id.clone();
    while let Some(parent) = current.parent() {
        if let Some(&d) = assigned.get(&parent) {
            return Distance::Finite(d);
        }
        current = parent;
    }
    Distance::Infinite
}
