//! Integration tests for Lattice
//!
//! These tests verify that the analysis, rendering, and streaming
//! layers work together over one shared module.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use lattice_analysis::{Broker, ModuleHolder, TopicConfig, TOPIC_WORKSPACE_STATUS};
use lattice_core::{
    render, request_hash, respond, Distance, DistanceRule, Edge, EdgeType, FileFilter,
    FileFilterMode, LensConfig, Module, NodeId, NodeKind, NodeVisibility, RenderRequest, Target,
};
use lattice_sources::{merge, PartialGraph};

fn library(pkg: &str, name: &str) -> Target {
    Target::new(NodeId::package(pkg), name, NodeKind::CcLibrary)
}

fn show_targets_rule(distance: Distance) -> DistanceRule {
    DistanceRule {
        distance,
        node_visibility: NodeVisibility {
            target_types: vec![
                NodeKind::CcLibrary,
                NodeKind::CcBinary,
                NodeKind::CcSharedLibrary,
            ],
            file_types: FileFilter::Mode(FileFilterMode::None),
            show_uncovered: false,
            show_external: false,
            show_system_libraries: false,
        },
        collapse_level: 0,
        show_edges: true,
        edge_types: None,
    }
}

fn hundred_node_module() -> Module {
    let mut module = Module::new("big", "/ws");
    for pkg in 0..10 {
        for t in 0..10 {
            module.add_target(library(&format!("pkg{pkg}"), &format!("t{t}")));
        }
    }
    for pkg in 0..9 {
        module.add_edge(Edge::new(
            NodeId::from(format!("//pkg{pkg}:t0").as_str()),
            NodeId::from(format!("//pkg{}:t0", pkg + 1).as_str()),
            EdgeType::Static,
        ));
    }
    module
}

/// A small module change produces a small diff, never a full graph.
#[test]
fn adding_two_edges_to_a_large_graph_diffs() {
    let module = hundred_node_module();
    let request = RenderRequest {
        default_lens: LensConfig {
            distance_rules: vec![show_targets_rule(Distance::Infinite)],
            ..LensConfig::default()
        },
        ..RenderRequest::default()
    };
    let hash = request_hash(&request);
    let first = render(&module.flat_graph(), &request).unwrap();

    let mut updated = module.clone();
    updated.add_edge(Edge::new(
        NodeId::from("//pkg0:t1"),
        NodeId::from("//pkg5:t5"),
        EdgeType::Compile,
    ));
    updated.add_edge(Edge::new(
        NodeId::from("//pkg2:t2"),
        NodeId::from("//pkg7:t7"),
        EdgeType::Compile,
    ));
    let second = render(&updated.flat_graph(), &request).unwrap();

    let response = respond(Some(&first), &second, hash);
    assert!(response.full_graph.is_none(), "two edges is a diff, not a reload");
    let diff = response.diff.unwrap();
    assert_eq!(diff.added_nodes.len(), 0);
    assert_eq!(diff.added_edges.len(), 2);
    assert_eq!(diff.removed_node_ids.len(), 0);
    assert_eq!(diff.removed_edge_keys.len(), 0);
}

/// Merged phase output flows through the holder into a render.
#[tokio::test]
async fn merge_then_render_through_the_holder() {
    let holder = ModuleHolder::new(Module::new("ws", "/ws"));

    let mut targets = std::collections::BTreeMap::new();
    for t in [library("a", "x"), library("a", "y"), library("b", "z")] {
        targets.insert(t.id(), t);
    }
    let bazel = PartialGraph {
        module_name: Some("ws".to_string()),
        targets: Some(targets),
        edges: vec![
            Edge::new(NodeId::from("//a:x"), NodeId::from("//b:z"), EdgeType::Static),
            Edge::new(NodeId::from("//a:y"), NodeId::from("//b:z"), EdgeType::Static),
        ],
        replaces: vec![EdgeType::Static, EdgeType::Dynamic, EdgeType::Data],
        ..PartialGraph::default()
    };
    let prior = holder.snapshot().await;
    holder.replace(merge(&prior, &[bazel])).await;

    let module = holder.snapshot().await;
    let request = RenderRequest {
        default_lens: LensConfig {
            distance_rules: vec![DistanceRule {
                collapse_level: 1,
                ..show_targets_rule(Distance::Infinite)
            }],
            ..LensConfig::default()
        },
        ..RenderRequest::default()
    };
    let rendered = render(&module.flat_graph(), &request).unwrap();

    let ids: Vec<_> = rendered.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["//a", "//b"]);
    assert_eq!(rendered.edges.len(), 1);
    assert_eq!(rendered.edges[0].count, 2);
}

/// Late subscribers to a latest-only topic see where the pipeline is.
#[tokio::test]
async fn status_topic_replays_the_latest_state() {
    let broker = Arc::new(Broker::new());
    broker.register_topic(TOPIC_WORKSPACE_STATUS, TopicConfig::latest_only());

    for state in ["initializing", "bazel_querying", "ready"] {
        broker.publish(
            TOPIC_WORKSPACE_STATUS,
            "status",
            serde_json::json!({ "state": state }),
        );
    }

    let mut subscription = broker.subscribe(TOPIC_WORKSPACE_STATUS);
    let replayed = subscription.recv().await.unwrap();
    assert_eq!(replayed.data["state"], "ready");
    assert_eq!(replayed.version, 2);
}

/// Cancellation reaches a pending subscription through broker close.
#[tokio::test]
async fn broker_close_ends_pending_subscriptions() {
    let broker = Arc::new(Broker::new());
    let mut subscription = broker.subscribe("target_graph");

    let waiter = tokio::spawn(async move { subscription.recv().await });
    tokio::task::yield_now().await;
    broker.close();
    assert!(waiter.await.unwrap().is_none());
}

/// Render caching: equal requests hash equal across selection order,
/// and a cancelled render never corrupts shared state (pure pipeline).
#[test]
fn request_hash_is_canonical() {
    let mut a = RenderRequest::default();
    a.selected = vec![NodeId::from("//b:z"), NodeId::from("//a:x")];
    let mut b = RenderRequest::default();
    b.selected = vec![NodeId::from("//a:x"), NodeId::from("//b:z")];
    assert_eq!(request_hash(&a), request_hash(&b));
    assert_ne!(request_hash(&a), request_hash(&RenderRequest::default()));
}

/// The cancellation token is honoured before any phase work happens.
#[tokio::test]
async fn cancelled_runner_exits_silently() {
    use lattice_analysis::{AnalysisOptions, AnalysisRunner};
    use lattice_sources::Workspace;

    let holder = Arc::new(ModuleHolder::new(Module::new("ws", "/ws")));
    let broker = Arc::new(Broker::new());
    let runner = AnalysisRunner::new(
        Workspace::with_output_dir("/ws", "/ws/bazel-bin"),
        holder.clone(),
        broker,
    );
    let cancel = CancellationToken::new();
    cancel.cancel();
    runner
        .run(&cancel, AnalysisOptions::full("cancelled before start"))
        .await
        .unwrap();
    assert_eq!(holder.snapshot().await.targets.len(), 0);
}
