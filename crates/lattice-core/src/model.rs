//! Core data model: nodes, typed edges, targets, packages, modules, issues

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::id::{IdFamily, NodeId};

/// Discriminates what a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Package,
    CcLibrary,
    CcBinary,
    CcSharedLibrary,
    SourceFile,
    HeaderFile,
    UncoveredSource,
    UncoveredHeader,
    SystemLibrary,
    External,
}

impl NodeKind {
    /// Kinds that represent buildable targets.
    pub fn is_target(self) -> bool {
        matches!(
            self,
            NodeKind::CcLibrary | NodeKind::CcBinary | NodeKind::CcSharedLibrary | NodeKind::External
        )
    }

    /// Kinds that represent files inside or outside targets.
    pub fn is_file(self) -> bool {
        matches!(
            self,
            NodeKind::SourceFile
                | NodeKind::HeaderFile
                | NodeKind::UncoveredSource
                | NodeKind::UncoveredHeader
        )
    }
}

/// A single node in the flat graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Display label; defaults to the id's string form.
    pub label: String,
    pub kind: NodeKind,
    /// Free-form metadata (symbol names, tool provenance).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Explicit `//visibility:public` on the declaring target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        let label = id.as_str().to_string();
        Node {
            id,
            label,
            kind,
            metadata: BTreeMap::new(),
            public: None,
        }
    }
}

/// What kind of dependency an edge represents. `Multi` is synthetic and
/// produced only by edge-type collapse in the lens renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Static,
    Dynamic,
    Data,
    Compile,
    Symbol,
    Multi,
}

/// Metadata key carrying the consumed symbol name on `symbol` edges.
pub const EDGE_META_SYMBOL: &str = "symbol";
/// Metadata key carrying the linkage tag on `symbol` edges.
pub const EDGE_META_LINKAGE: &str = "linkage";

/// A directed, typed edge. Unique per (from, to, type) within a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, edge_type: EdgeType) -> Self {
        Edge {
            from,
            to,
            edge_type,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Uniqueness key per (M2).
    pub fn key(&self) -> (NodeId, NodeId, EdgeType) {
        (self.from.clone(), self.to.clone(), self.edge_type)
    }
}

/// A buildable unit declared in a BUILD file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Package id, e.g. `//a/b` or `@zlib//`.
    pub package: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Package-relative source files.
    #[serde(default)]
    pub srcs: Vec<String>,
    /// Package-relative header files.
    #[serde(default)]
    pub hdrs: Vec<String>,
    /// Raw linker flags; only used to surface system libraries.
    #[serde(default)]
    pub linkopts: Vec<String>,
    #[serde(default)]
    pub visibility: Vec<String>,
}

impl Target {
    pub fn new(package: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Target {
            package,
            name: name.into(),
            kind,
            srcs: Vec::new(),
            hdrs: Vec::new(),
            linkopts: Vec::new(),
            visibility: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        NodeId::target(self.package.as_str(), &self.name)
    }

    /// A target is public iff it declares `//visibility:public`.
    pub fn is_public(&self) -> bool {
        self.visibility.iter().any(|v| v == "//visibility:public")
    }

    /// Workspace-relative path of a package-relative file.
    pub fn workspace_rel(&self, rel: &str) -> String {
        let pkg = self.package.as_str().trim_start_matches('/');
        if pkg.is_empty() {
            rel.to_string()
        } else {
            format!("{pkg}/{rel}")
        }
    }

    /// File node ids with kinds, sources first.
    pub fn files(&self) -> Vec<(NodeId, NodeKind)> {
        let id = self.id();
        self.srcs
            .iter()
            .map(|rel| (NodeId::file(&id, rel), NodeKind::SourceFile))
            .chain(
                self.hdrs
                    .iter()
                    .map(|rel| (NodeId::file(&id, rel), NodeKind::HeaderFile)),
            )
            .collect()
    }
}

/// A grouping of targets under one BUILD file; derived, never authored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Package {
    pub id: NodeId,
    pub targets: Vec<NodeId>,
}

/// Why two targets are flagged together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    DuplicateLinkage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// A dependency hygiene finding attached to an ordered target pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyIssue {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: IssueKind,
    pub severity: Severity,
    pub description: String,
    pub edge_types: Vec<EdgeType>,
}

/// The canonical analysed workspace: targets, typed edges, issues.
/// Replaced wholesale after every merge; never mutated by readers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Module {
    pub name: String,
    pub workspace_root: PathBuf,
    pub targets: BTreeMap<NodeId, Target>,
    pub dependencies: Vec<Edge>,
    pub issues: Vec<DependencyIssue>,
    /// File-to-file compile/symbol pairs kept for file-level views.
    pub file_dependencies: Vec<Edge>,
    /// Workspace-relative paths of files no target claims.
    pub uncovered_files: BTreeSet<String>,
    /// System library names surfaced from linker flags and `ldd`.
    pub system_libraries: BTreeSet<String>,
    #[serde(skip)]
    edge_keys: HashSet<(NodeId, NodeId, EdgeType)>,
    #[serde(skip)]
    file_edge_keys: HashSet<(NodeId, NodeId, EdgeType)>,
}

impl Module {
    pub fn new(name: impl Into<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Module {
            name: name.into(),
            workspace_root: workspace_root.into(),
            ..Default::default()
        }
    }

    /// Insert or replace a target. Last writer wins.
    pub fn add_target(&mut self, target: Target) -> NodeId {
        let id = target.id();
        self.targets.insert(id.clone(), target);
        id
    }

    /// Append a target-level edge, enforcing (M1), (M2) and (M4).
    /// Returns false when the edge was dropped.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if edge.edge_type == EdgeType::Symbol && edge.from == edge.to {
            return false;
        }
        if !self.targets.contains_key(&edge.from) {
            tracing::debug!(from = %edge.from, "dropping edge from unknown target");
            return false;
        }
        if !self.edge_keys.insert(edge.key()) {
            return false;
        }
        self.dependencies.push(edge);
        true
    }

    /// Record a file-level pair for file views; same (M2)/(M4) discipline.
    pub fn add_file_dependency(&mut self, edge: Edge) -> bool {
        if edge.edge_type == EdgeType::Symbol && edge.from == edge.to {
            return false;
        }
        if !self.file_edge_keys.insert(edge.key()) {
            return false;
        }
        self.file_dependencies.push(edge);
        true
    }

    /// Derive the package set from the current targets.
    pub fn get_packages(&self) -> Vec<Package> {
        let mut by_pkg: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for (id, target) in &self.targets {
            by_pkg
                .entry(target.package.clone())
                .or_default()
                .push(id.clone());
        }
        by_pkg
            .into_iter()
            .map(|(id, targets)| Package { id, targets })
            .collect()
    }

    /// Aggregate typed edges to package level, discarding same-package
    /// edges. Unique per (package, package, type), sorted.
    pub fn get_all_package_dependencies(&self) -> Vec<Edge> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for edge in &self.dependencies {
            let (Some(from_pkg), Some(to_pkg)) = (edge.from.package_id(), edge.to.package_id())
            else {
                continue;
            };
            if from_pkg == to_pkg {
                continue;
            }
            if seen.insert((from_pkg.clone(), to_pkg.clone(), edge.edge_type)) {
                out.push(Edge::new(from_pkg, to_pkg, edge.edge_type));
            }
        }
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        out
    }

    /// Scan all (from, to) pairs and record a `duplicate_linkage` issue
    /// wherever both a static/symbol and a dynamic edge exist (M3).
    /// Clears previously detected issues of that kind first.
    pub fn detect_duplicate_linkage(&mut self) {
        self.issues.retain(|i| i.kind != IssueKind::DuplicateLinkage);
        let mut pair_types: BTreeMap<(NodeId, NodeId), BTreeSet<EdgeType>> = BTreeMap::new();
        for edge in &self.dependencies {
            pair_types
                .entry((edge.from.clone(), edge.to.clone()))
                .or_default()
                .insert(edge.edge_type);
        }
        for ((from, to), types) in pair_types {
            let static_like =
                types.contains(&EdgeType::Static) || types.contains(&EdgeType::Symbol);
            if static_like && types.contains(&EdgeType::Dynamic) {
                self.issues.push(DependencyIssue {
                    description: format!(
                        "{from} links {to} both statically and dynamically"
                    ),
                    from,
                    to,
                    kind: IssueKind::DuplicateLinkage,
                    severity: Severity::Warning,
                    edge_types: types.into_iter().collect(),
                });
            }
        }
    }

    /// Materialise the flat node/edge view the lens renderer consumes.
    pub fn flat_graph(&self) -> FlatGraph {
        let mut nodes: BTreeMap<NodeId, Node> = BTreeMap::new();
        for target in self.targets.values() {
            let id = target.id();
            let mut node = Node::new(id.clone(), target.kind);
            node.public = Some(target.is_public());
            nodes.insert(id, node);
            for (file_id, kind) in target.files() {
                nodes.entry(file_id.clone()).or_insert_with(|| Node::new(file_id, kind));
            }
        }
        for path in &self.uncovered_files {
            let id = NodeId::uncovered(path);
            let kind = if is_header_path(path) {
                NodeKind::UncoveredHeader
            } else {
                NodeKind::UncoveredSource
            };
            nodes.insert(id.clone(), Node::new(id, kind));
        }
        for name in &self.system_libraries {
            let id = NodeId::system_library(name);
            nodes.insert(id.clone(), Node::new(id, NodeKind::SystemLibrary));
        }
        // Edges can reach system libraries the linkopts scan never named.
        for edge in self.dependencies.iter().chain(&self.file_dependencies) {
            for endpoint in [&edge.from, &edge.to] {
                if endpoint.family() == IdFamily::SystemLibrary {
                    nodes.entry(endpoint.clone()).or_insert_with(|| {
                        Node::new(endpoint.clone(), NodeKind::SystemLibrary)
                    });
                }
            }
        }
        let mut edges: Vec<Edge> = self
            .dependencies
            .iter()
            .chain(&self.file_dependencies)
            .cloned()
            .collect();
        edges.sort_by(|a, b| a.key().cmp(&b.key()));
        FlatGraph { nodes, edges }
    }
}

/// Whether a workspace-relative path looks like a header.
pub fn is_header_path(path: &str) -> bool {
    matches!(
        std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str()),
        Some("h" | "hh" | "hpp" | "hxx" | "inc")
    )
}

/// The renderer's input: every node the module implies plus all typed
/// edges (target-level and file-level), deterministically ordered.
#[derive(Debug, Clone, Serialize)]
pub struct FlatGraph {
    pub nodes: BTreeMap<NodeId, Node>,
    pub edges: Vec<Edge>,
}
