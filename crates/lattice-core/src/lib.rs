//! Lattice Core — graph data model, lens renderer, and diff engine

pub mod cache;
pub mod diff;
pub mod error;
pub mod id;
pub mod lens;
pub mod model;
pub mod render;

#[cfg(test)]
mod tests;

#[cfg(test)]
pub mod test_utils;

pub use cache::{request_hash, CachedRender, RenderCache};
pub use diff::{compute_diff, respond, GraphDiff, GraphSnapshot, LensResponse};
pub use error::RenderError;
pub use id::{HierarchyLevel, IdFamily, NodeId};
pub use lens::{
    AppliedLens, BaseSet, Distance, DistanceRule, EdgeRules, FileFilter, FileFilterMode,
    GlobalFilters, LensConfig, NodeState, NodeVisibility,
};
pub use model::{
    DependencyIssue, Edge, EdgeType, FlatGraph, IssueKind, Module, Node, NodeKind, Package,
    Severity, Target, EDGE_META_LINKAGE, EDGE_META_SYMBOL,
};
pub use render::{
    find_visible_ancestor, render, RenderRequest, RenderedEdge, RenderedGraph, RenderedNode,
};
