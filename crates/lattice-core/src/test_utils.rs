//! Shared fixtures for core tests

use crate::id::NodeId;
use crate::lens::{
    Distance, DistanceRule, FileFilter, FileFilterMode, LensConfig, NodeVisibility,
};
use crate::model::{Edge, EdgeType, Module, NodeKind, Target};

/// All three concrete target kinds, for rules that show every target.
pub fn all_target_kinds() -> Vec<NodeKind> {
    vec![
        NodeKind::CcLibrary,
        NodeKind::CcBinary,
        NodeKind::CcSharedLibrary,
    ]
}

pub fn library(pkg: &str, name: &str) -> Target {
    Target::new(NodeId::package(pkg), name, NodeKind::CcLibrary)
}

pub fn binary(pkg: &str, name: &str) -> Target {
    Target::new(NodeId::package(pkg), name, NodeKind::CcBinary)
}

/// A rule showing every target kind, nothing else.
pub fn targets_rule(distance: Distance, collapse_level: u8) -> DistanceRule {
    DistanceRule {
        distance,
        node_visibility: NodeVisibility {
            target_types: all_target_kinds(),
            file_types: FileFilter::Mode(FileFilterMode::None),
            show_uncovered: false,
            show_external: false,
            show_system_libraries: false,
        },
        collapse_level,
        show_edges: true,
        edge_types: None,
    }
}

/// A rule hiding everything; used as the `infinite` tail of detail lenses.
pub fn hide_all_rule() -> DistanceRule {
    DistanceRule {
        distance: Distance::Infinite,
        node_visibility: NodeVisibility::default(),
        collapse_level: 0,
        show_edges: false,
        edge_types: None,
    }
}

/// A lens with the given rules and default filters.
pub fn lens_with_rules(rules: Vec<DistanceRule>) -> LensConfig {
    LensConfig {
        distance_rules: rules,
        ..LensConfig::default()
    }
}

/// The S-series module: `//a:x`, `//a:y`, `//b:z`, with static edges
/// x→z and y→z.
pub fn sample_module() -> Module {
    let mut module = Module::new("sample", "/ws");
    let x = module.add_target(library("a", "x"));
    let y = module.add_target(library("a", "y"));
    let z = module.add_target(library("b", "z"));
    module.add_edge(Edge::new(x.clone(), z.clone(), EdgeType::Static));
    module.add_edge(Edge::new(y, z, EdgeType::Static));
    module
}
