//! Compose partial results into the next canonical module

use lattice_core::{EdgeType, Module};

use crate::source::PartialGraph;

/// Merge fresh phase results into a new module, starting from the prior
/// one. Deterministic and total: the output never reflects a partially
/// applied phase.
///
/// Each partial may overwrite the data it owns (targets, uncovered set,
/// system libraries) and declares the edge types it replaces; everything
/// else carries over from the prior module. Edge appends enforce pair
/// uniqueness and drop self-symbol edges; duplicate-linkage issues are
/// recomputed at the end.
pub fn merge(prior: &Module, results: &[PartialGraph]) -> Module {
    let name = results
        .iter()
        .rev()
        .find_map(|r| r.module_name.clone())
        .unwrap_or_else(|| prior.name.clone());
    let mut module = Module::new(name, prior.workspace_root.clone());

    let targets = results
        .iter()
        .rev()
        .find_map(|r| r.targets.clone())
        .unwrap_or_else(|| prior.targets.clone());
    for (_, target) in targets {
        module.add_target(target);
    }

    module.uncovered_files = results
        .iter()
        .rev()
        .find_map(|r| r.uncovered.clone())
        .unwrap_or_else(|| prior.uncovered_files.clone());
    module.system_libraries = results
        .iter()
        .rev()
        .find_map(|r| r.system_libraries.clone())
        .unwrap_or_else(|| prior.system_libraries.clone());

    // Prior edges survive unless a fresh phase owns their type. Re-adding
    // through the module revalidates them against the new target table.
    let replaced: Vec<EdgeType> = results.iter().flat_map(|r| r.replaces.clone()).collect();
    for edge in &prior.dependencies {
        if !replaced.contains(&edge.edge_type) {
            module.add_edge(edge.clone());
        }
    }
    for edge in &prior.file_dependencies {
        if !replaced.contains(&edge.edge_type) {
            module.add_file_dependency(edge.clone());
        }
    }
    for result in results {
        for edge in &result.edges {
            module.add_edge(edge.clone());
        }
        for edge in &result.file_edges {
            module.add_file_dependency(edge.clone());
        }
    }

    module.detect_duplicate_linkage();
    module
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::{Edge, IssueKind, NodeId, NodeKind, Target};
    use std::collections::BTreeMap;

    fn target(pkg: &str, name: &str) -> Target {
        Target::new(NodeId::package(pkg), name, NodeKind::CcLibrary)
    }

    fn target_table(targets: Vec<Target>) -> BTreeMap<NodeId, Target> {
        targets.into_iter().map(|t| (t.id(), t)).collect()
    }

    #[test]
    fn appends_edges_with_dedup() {
        let mut prior = Module::new("m", "/ws");
        let a = prior.add_target(target("a", "x"));
        let b = prior.add_target(target("b", "z"));
        prior.add_edge(Edge::new(a.clone(), b.clone(), EdgeType::Compile));

        let fresh = PartialGraph {
            edges: vec![
                Edge::new(a.clone(), b.clone(), EdgeType::Symbol),
                Edge::new(a.clone(), b.clone(), EdgeType::Symbol),
            ],
            replaces: vec![EdgeType::Symbol],
            ..PartialGraph::default()
        };
        let merged = merge(&prior, &[fresh]);
        assert_eq!(merged.dependencies.len(), 2, "compile kept, one symbol added");
    }

    #[test]
    fn replaced_types_drop_prior_contribution() {
        let mut prior = Module::new("m", "/ws");
        let a = prior.add_target(target("a", "x"));
        let b = prior.add_target(target("b", "z"));
        let c = prior.add_target(target("c", "w"));
        prior.add_edge(Edge::new(a.clone(), b.clone(), EdgeType::Compile));
        prior.add_edge(Edge::new(a.clone(), c, EdgeType::Static));

        // A fresh compile phase that no longer sees the a→b include.
        let fresh = PartialGraph {
            replaces: vec![EdgeType::Compile],
            ..PartialGraph::default()
        };
        let merged = merge(&prior, &[fresh]);
        assert_eq!(merged.dependencies.len(), 1);
        assert_eq!(merged.dependencies[0].edge_type, EdgeType::Static);
    }

    #[test]
    fn target_overwrite_revalidates_carried_edges() {
        let mut prior = Module::new("m", "/ws");
        let a = prior.add_target(target("a", "x"));
        let b = prior.add_target(target("b", "z"));
        prior.add_edge(Edge::new(a.clone(), b, EdgeType::Compile));

        // Bazel re-ran and `//a:x` no longer exists.
        let fresh = PartialGraph {
            module_name: Some("renamed".to_string()),
            targets: Some(target_table(vec![target("b", "z")])),
            replaces: vec![EdgeType::Static, EdgeType::Dynamic, EdgeType::Data],
            ..PartialGraph::default()
        };
        let merged = merge(&prior, &[fresh]);
        assert_eq!(merged.name, "renamed");
        assert!(
            merged.dependencies.is_empty(),
            "carried compile edge from a removed target is dropped"
        );
    }

    #[test]
    fn duplicate_linkage_detected_across_phases() {
        let mut prior = Module::new("m", "/ws");
        let p = prior.add_target(target("m", "p"));
        let q = prior.add_target(target("m", "q"));
        prior.add_edge(Edge::new(p.clone(), q.clone(), EdgeType::Static));

        let fresh = PartialGraph {
            edges: vec![Edge::new(p, q, EdgeType::Dynamic)],
            ..PartialGraph::default()
        };
        let merged = merge(&prior, &[fresh]);
        assert_eq!(merged.issues.len(), 1);
        assert_eq!(merged.issues[0].kind, IssueKind::DuplicateLinkage);
    }

    #[test]
    fn merge_of_nothing_preserves_the_prior_module() {
        let mut prior = Module::new("m", "/ws");
        let a = prior.add_target(target("a", "x"));
        let b = prior.add_target(target("b", "z"));
        prior.add_edge(Edge::new(a, b, EdgeType::Static));
        prior.uncovered_files.insert("stray.cc".to_string());
        prior.system_libraries.insert("dl".to_string());

        let merged = merge(&prior, &[]);
        assert_eq!(merged.name, prior.name);
        assert_eq!(merged.targets.len(), 2);
        assert_eq!(merged.dependencies.len(), 1);
        assert_eq!(merged.uncovered_files, prior.uncovered_files);
        assert_eq!(merged.system_libraries, prior.system_libraries);
    }
}
