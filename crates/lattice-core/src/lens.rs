//! Lens configuration: the declarative filter a render request carries

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::model::{EdgeType, NodeKind};

/// Undirected hop count from the selection, or unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Distance {
    Finite(u32),
    Infinite,
}

impl Distance {
    pub fn is_finite(self) -> bool {
        matches!(self, Distance::Finite(_))
    }

    pub fn min(self, other: Distance) -> Distance {
        match (self, other) {
            (Distance::Finite(a), Distance::Finite(b)) => Distance::Finite(a.min(b)),
            (Distance::Finite(a), Distance::Infinite) => Distance::Finite(a),
            (Distance::Infinite, d) => d,
        }
    }
}

impl Serialize for Distance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Distance::Finite(n) => serializer.serialize_u32(*n),
            Distance::Infinite => serializer.serialize_str("infinite"),
        }
    }
}

impl<'de> Deserialize<'de> for Distance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DistanceVisitor;
        impl<'de> Visitor<'de> for DistanceVisitor {
            type Value = Distance;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative integer or \"infinite\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Distance, E> {
                u32::try_from(v)
                    .map(Distance::Finite)
                    .map_err(|_| E::custom("distance out of range"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Distance, E> {
                u32::try_from(v)
                    .map(Distance::Finite)
                    .map_err(|_| E::custom("distance out of range"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Distance, E> {
                if v == "infinite" {
                    Ok(Distance::Infinite)
                } else {
                    Err(E::custom(format!("unknown distance {v:?}")))
                }
            }
        }
        deserializer.deserialize_any(DistanceVisitor)
    }
}

/// What the render starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BaseSet {
    #[default]
    FullGraph,
    ReachableFromBinary {
        label: String,
    },
    PackageLevel {
        path: String,
    },
}

/// File-kind portion of a rule's visibility: everything, nothing, or an
/// explicit kind list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileFilter {
    Mode(FileFilterMode),
    Kinds(Vec<NodeKind>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFilterMode {
    All,
    None,
}

impl Default for FileFilter {
    fn default() -> Self {
        FileFilter::Mode(FileFilterMode::None)
    }
}

impl FileFilter {
    pub fn allows(&self, kind: NodeKind) -> bool {
        match self {
            FileFilter::Mode(FileFilterMode::All) => true,
            FileFilter::Mode(FileFilterMode::None) => false,
            FileFilter::Kinds(kinds) => kinds.contains(&kind),
        }
    }
}

/// Per-rule node visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeVisibility {
    /// Target kinds this rule lets through.
    pub target_types: Vec<NodeKind>,
    /// File kinds this rule lets through.
    pub file_types: FileFilter,
    pub show_uncovered: bool,
    pub show_external: bool,
    pub show_system_libraries: bool,
}

/// One entry of a lens's ordered distance policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceRule {
    pub distance: Distance,
    #[serde(default)]
    pub node_visibility: NodeVisibility,
    /// Hierarchy level whose descendants are suppressed; 0 disables.
    #[serde(default)]
    pub collapse_level: u8,
    #[serde(default = "default_true")]
    pub show_edges: bool,
    /// When set, only these edge types may touch nodes matched by this rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_types: Option<Vec<EdgeType>>,
}

fn default_true() -> bool {
    true
}

/// Lens-wide node filters applied after rule matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalFilters {
    pub hide_external: bool,
    pub hide_uncovered: bool,
    pub hide_system_libs: bool,
    /// Linker view: only binaries, shared libraries, system libraries and
    /// the packages containing a still-visible binary.
    pub show_only_ldd: bool,
}

/// Lens-wide edge policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeRules {
    /// Edge types the lens lets through.
    pub types: Vec<EdgeType>,
    /// Keep edges whose endpoints were remapped to a visible ancestor;
    /// when false only direct edges between visible nodes survive.
    pub aggregate_collapsed: bool,
    /// Merge all types between one ordered pair into a single `multi` edge.
    pub collapse_edge_types: bool,
    /// Drop aggregated edges representing fewer originals than this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_count: Option<u32>,
}

impl Default for EdgeRules {
    fn default() -> Self {
        EdgeRules {
            types: vec![
                EdgeType::Static,
                EdgeType::Dynamic,
                EdgeType::Data,
                EdgeType::Compile,
                EdgeType::Symbol,
            ],
            aggregate_collapsed: true,
            collapse_edge_types: false,
            min_count: None,
        }
    }
}

/// A complete declarative graph filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LensConfig {
    pub base_set: BaseSet,
    pub distance_rules: Vec<DistanceRule>,
    pub global_filters: GlobalFilters,
    pub edge_rules: EdgeRules,
}

impl Default for LensConfig {
    fn default() -> Self {
        LensConfig {
            base_set: BaseSet::FullGraph,
            distance_rules: vec![DistanceRule {
                distance: Distance::Infinite,
                node_visibility: NodeVisibility {
                    target_types: vec![
                        NodeKind::CcLibrary,
                        NodeKind::CcBinary,
                        NodeKind::CcSharedLibrary,
                    ],
                    file_types: FileFilter::default(),
                    show_uncovered: false,
                    show_external: false,
                    show_system_libraries: false,
                },
                collapse_level: 2,
                show_edges: true,
                edge_types: None,
            }],
            global_filters: GlobalFilters::default(),
            edge_rules: EdgeRules::default(),
        }
    }
}

impl LensConfig {
    /// Reject configurations the renderer cannot evaluate.
    pub fn validate(&self) -> Result<(), crate::error::RenderError> {
        use crate::error::RenderError;
        match &self.base_set {
            BaseSet::FullGraph => {}
            BaseSet::ReachableFromBinary { label } => {
                if label.is_empty() {
                    return Err(RenderError::InvalidLens(
                        "reachableFromBinary requires a label".into(),
                    ));
                }
            }
            BaseSet::PackageLevel { path } => {
                if path.is_empty() {
                    return Err(RenderError::InvalidLens(
                        "packageLevel requires a path".into(),
                    ));
                }
            }
        }
        for rule in &self.distance_rules {
            if rule.collapse_level > 3 {
                return Err(RenderError::InvalidLens(format!(
                    "collapseLevel {} out of range 0..=3",
                    rule.collapse_level
                )));
            }
        }
        Ok(())
    }
}

/// Which of the two request lenses a node was evaluated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedLens {
    Default,
    Detail,
}

/// Per-node render-time state; lives only for the duration of one render.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub visible: bool,
    pub collapsed: bool,
    pub distance: Distance,
    pub applied_lens: AppliedLens,
    /// Index into the lens's `distance_rules`, when one matched.
    pub rule: Option<usize>,
}
