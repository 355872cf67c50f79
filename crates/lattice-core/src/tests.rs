//! Cross-module renderer scenarios

use std::collections::BTreeSet;

use crate::id::NodeId;
use crate::lens::{BaseSet, Distance, FileFilter, FileFilterMode, GlobalFilters};
use crate::model::{Edge, EdgeType, NodeKind};
use crate::render::{render, RenderRequest};
use crate::test_utils::*;

fn ids(request: &RenderRequest, module: &crate::model::Module) -> Vec<String> {
    let rendered = render(&module.flat_graph(), request).unwrap();
    rendered
        .nodes
        .iter()
        .map(|n| n.id.as_str().to_string())
        .collect()
}

#[test]
fn package_only_view_aggregates_edges() {
    // No selection; default lens collapses at package level.
    let module = sample_module();
    let request = RenderRequest {
        default_lens: lens_with_rules(vec![targets_rule(Distance::Infinite, 1)]),
        ..RenderRequest::default()
    };

    let rendered = render(&module.flat_graph(), &request).unwrap();
    let node_ids: Vec<_> = rendered.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(node_ids, vec!["//a", "//b"]);
    assert!(rendered.nodes.iter().all(|n| n.collapsed));

    assert_eq!(rendered.edges.len(), 1, "two static edges aggregate into one");
    let edge = &rendered.edges[0];
    assert_eq!(edge.source, NodeId::from("//a"));
    assert_eq!(edge.target, NodeId::from("//b"));
    assert_eq!(edge.edge_type, EdgeType::Static);
    assert_eq!(edge.count, 2);
}

#[test]
fn focus_on_single_target_shows_neighbourhood() {
    let mut module = sample_module();
    {
        let x = module.targets.get_mut(&NodeId::from("//a:x")).unwrap();
        x.srcs = vec!["x.cc".to_string()];
        x.hdrs = vec!["x.h".to_string()];
        let z = module.targets.get_mut(&NodeId::from("//b:z")).unwrap();
        z.srcs = vec!["z.cc".to_string()];
    }

    let mut near = targets_rule(Distance::Finite(0), 0);
    near.node_visibility.file_types = FileFilter::Mode(FileFilterMode::All);
    let next = targets_rule(Distance::Finite(1), 2);
    let detail = lens_with_rules(vec![near, next, hide_all_rule()]);

    let request = RenderRequest {
        detail_lens: detail,
        selected: vec![NodeId::from("//a:x")],
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();

    let node_ids: Vec<_> = rendered.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(
        node_ids,
        vec!["//a", "//a:x", "//a:x:x.cc", "//a:x:x.h", "//b", "//b:z"]
    );
    assert!(
        !node_ids.contains(&"//a:y"),
        "two hops away falls to the hiding infinite rule"
    );

    let z = rendered
        .nodes
        .iter()
        .find(|n| n.id == NodeId::from("//b:z"))
        .unwrap();
    assert!(z.collapsed, "distance-1 rule collapses at target level");
    assert_eq!(z.distance, Distance::Finite(1));

    assert_eq!(rendered.edges.len(), 1);
    assert_eq!(rendered.edges[0].source, NodeId::from("//a:x"));
    assert_eq!(rendered.edges[0].target, NodeId::from("//b:z"));
    assert_eq!(rendered.edges[0].edge_type, EdgeType::Static);
}

#[test]
fn selecting_a_package_expands_to_targets_and_uncovered_files() {
    let mut module = crate::model::Module::new("m", "/ws");
    let mut util = library("util", "util");
    util.srcs = vec!["util.cc".to_string()];
    module.add_target(util);
    module.uncovered_files.insert("util/orphaned.cc".to_string());

    let mut near = targets_rule(Distance::Finite(0), 0);
    near.node_visibility.file_types = FileFilter::Mode(FileFilterMode::All);
    near.node_visibility.show_uncovered = true;
    let detail = lens_with_rules(vec![near, hide_all_rule()]);

    let request = RenderRequest {
        detail_lens: detail,
        selected: vec![NodeId::from("//util")],
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();

    let uncovered = rendered
        .nodes
        .iter()
        .find(|n| n.id == NodeId::from("uncovered:util/orphaned.cc"))
        .expect("uncovered file is part of the selection");
    assert_eq!(uncovered.distance, Distance::Finite(0));
    assert_eq!(uncovered.kind, NodeKind::UncoveredSource);
    assert_eq!(uncovered.parent, Some(NodeId::from("//util")));

    let target = rendered
        .nodes
        .iter()
        .find(|n| n.id == NodeId::from("//util:util"))
        .unwrap();
    assert_eq!(target.distance, Distance::Finite(0));
}

#[test]
fn render_is_deterministic() {
    let module = sample_module();
    let request = RenderRequest {
        default_lens: lens_with_rules(vec![targets_rule(Distance::Infinite, 0)]),
        ..RenderRequest::default()
    };
    let flat = module.flat_graph();
    let first = serde_json::to_string(&render(&flat, &request).unwrap()).unwrap();
    let second = serde_json::to_string(&render(&flat, &request).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn distance_monotonicity_along_edges() {
    let mut module = sample_module();
    let x = NodeId::from("//a:x");
    let w = module.add_target(library("c", "w"));
    module.add_edge(Edge::new(w, NodeId::from("//b:z"), EdgeType::Compile));

    let request = RenderRequest {
        detail_lens: lens_with_rules(vec![
            targets_rule(Distance::Finite(0), 0),
            targets_rule(Distance::Finite(1), 0),
            targets_rule(Distance::Finite(2), 0),
            targets_rule(Distance::Infinite, 0),
        ]),
        selected: vec![x],
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();

    let distance_of = |id: &NodeId| {
        rendered
            .nodes
            .iter()
            .find(|n| n.id == *id)
            .map(|n| n.distance)
    };
    for edge in &rendered.edges {
        if let (Some(Distance::Finite(a)), Some(Distance::Finite(b))) =
            (distance_of(&edge.source), distance_of(&edge.target))
        {
            assert!(
                a.abs_diff(b) <= 1,
                "edge {} -> {} spans distances {a} and {b}",
                edge.source,
                edge.target
            );
        }
    }
}

#[test]
fn visible_ancestor_prefers_targets_over_packages() {
    let kept: BTreeSet<NodeId> = [NodeId::from("//a"), NodeId::from("//a:x")]
        .into_iter()
        .collect();
    let file = NodeId::from("//a:x:src/f.cc");
    assert_eq!(
        crate::render::find_visible_ancestor(&file, &kept),
        Some(NodeId::from("//a:x"))
    );

    let package_only: BTreeSet<NodeId> = [NodeId::from("//a")].into_iter().collect();
    assert_eq!(
        crate::render::find_visible_ancestor(&file, &package_only),
        Some(NodeId::from("//a"))
    );
}

#[test]
fn show_only_ldd_keeps_binaries_and_their_packages() {
    let mut module = crate::model::Module::new("m", "/ws");
    let app = module.add_target(binary("app", "main"));
    let lib = module.add_target(library("lib", "core"));
    module.add_edge(Edge::new(app.clone(), lib.clone(), EdgeType::Static));
    module.system_libraries.insert("pthread".to_string());
    module.add_edge(
        Edge::new(app, NodeId::system_library("pthread"), EdgeType::Dynamic),
    );

    let mut rule = targets_rule(Distance::Infinite, 0);
    rule.node_visibility.show_system_libraries = true;
    let mut lens = lens_with_rules(vec![rule]);
    lens.global_filters = GlobalFilters {
        show_only_ldd: true,
        ..GlobalFilters::default()
    };

    let request = RenderRequest {
        default_lens: lens,
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();
    let node_ids: Vec<_> = rendered.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(node_ids, vec!["//app", "//app:main", "pthread"]);
}

#[test]
fn collapse_edge_types_merges_into_multi() {
    let mut module = sample_module();
    module.add_edge(Edge::new(
        NodeId::from("//a:x"),
        NodeId::from("//b:z"),
        EdgeType::Compile,
    ));

    let mut lens = lens_with_rules(vec![targets_rule(Distance::Infinite, 1)]);
    lens.edge_rules.collapse_edge_types = true;

    let request = RenderRequest {
        default_lens: lens,
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();
    assert_eq!(rendered.edges.len(), 1);
    assert_eq!(rendered.edges[0].edge_type, EdgeType::Multi);
    assert_eq!(rendered.edges[0].count, 3);
}

#[test]
fn minimum_count_drops_thin_aggregates() {
    let module = sample_module();
    let mut lens = lens_with_rules(vec![targets_rule(Distance::Infinite, 1)]);
    lens.edge_rules.min_count = Some(3);
    let request = RenderRequest {
        default_lens: lens,
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();
    assert!(rendered.edges.is_empty(), "count 2 is below the minimum of 3");
}

#[test]
fn disabling_aggregation_keeps_only_direct_edges() {
    let module = sample_module();
    let mut lens = lens_with_rules(vec![targets_rule(Distance::Infinite, 1)]);
    lens.edge_rules.aggregate_collapsed = false;
    let request = RenderRequest {
        default_lens: lens,
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();
    assert!(
        rendered.edges.is_empty(),
        "package view has no direct target edges once aggregation is off"
    );
}

#[test]
fn reachable_from_binary_narrows_the_graph() {
    let mut module = sample_module();
    let main = module.add_target(binary("app", "main"));
    module.add_edge(Edge::new(main, NodeId::from("//a:x"), EdgeType::Static));
    // //a:y is not reachable from //app:main.

    let mut lens = lens_with_rules(vec![targets_rule(Distance::Infinite, 0)]);
    lens.base_set = BaseSet::ReachableFromBinary {
        label: "//app:main".to_string(),
    };
    let request = RenderRequest {
        default_lens: lens,
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();
    let node_ids: Vec<_> = rendered.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(node_ids, vec!["//a", "//a:x", "//app", "//app:main", "//b", "//b:z"]);
}

#[test]
fn unknown_reachability_root_is_a_client_error() {
    let module = sample_module();
    let mut lens = lens_with_rules(vec![targets_rule(Distance::Infinite, 0)]);
    lens.base_set = BaseSet::ReachableFromBinary {
        label: "//ghost:main".to_string(),
    };
    let request = RenderRequest {
        default_lens: lens,
        ..RenderRequest::default()
    };
    assert!(render(&module.flat_graph(), &request).is_err());
}

#[test]
fn package_level_base_set_scopes_to_subtree() {
    let mut module = sample_module();
    module.add_target(library("a/inner", "deep"));

    let mut lens = lens_with_rules(vec![targets_rule(Distance::Infinite, 0)]);
    lens.base_set = BaseSet::PackageLevel {
        path: "a".to_string(),
    };
    let request = RenderRequest {
        default_lens: lens,
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();
    let node_ids: Vec<_> = rendered.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(
        node_ids,
        vec!["//a", "//a/inner", "//a/inner:deep", "//a:x", "//a:y"]
    );
}

#[test]
fn hidden_kinds_never_panic_the_renderer() {
    // A module edge can point at an id the lens has no interest in; the
    // renderer hides it instead of failing.
    let mut module = sample_module();
    module.add_edge(Edge::new(
        NodeId::from("//a:x"),
        NodeId::system_library("dl"),
        EdgeType::Dynamic,
    ));
    let request = RenderRequest {
        default_lens: lens_with_rules(vec![targets_rule(Distance::Infinite, 0)]),
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();
    assert!(rendered.nodes.iter().all(|n| n.id != NodeId::from("dl")));
}

#[test]
fn empty_selection_uses_default_lens_and_infinite_distances() {
    let module = sample_module();
    let request = RenderRequest {
        default_lens: lens_with_rules(vec![targets_rule(Distance::Infinite, 0)]),
        detail_lens: lens_with_rules(vec![hide_all_rule()]),
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();
    assert!(!rendered.nodes.is_empty());
    assert!(rendered
        .nodes
        .iter()
        .all(|n| n.distance == Distance::Infinite));

    // A detail lens that hides everything only bites once something is
    // selected.
    let focused = RenderRequest {
        selected: vec![NodeId::from("//a:x")],
        ..request
    };
    let rendered = render(&module.flat_graph(), &focused).unwrap();
    assert!(rendered.nodes.is_empty());

    assert_eq!(ids(&focused, &module).len(), 0);
}
