//! The adapter seam: every analysis phase is a `Source`

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lattice_core::{Edge, EdgeType, Module, NodeId, Target};

use crate::error::SourceError;

/// The workspace under analysis: its root and the build-output directory
/// (dereferenced once, since bazel exposes it as a symlink).
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub output_dir: PathBuf,
}

impl Workspace {
    /// Conventional bazel output symlink name.
    pub const OUTPUT_LINK: &'static str = "bazel-bin";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let link = root.join(Self::OUTPUT_LINK);
        let output_dir = std::fs::canonicalize(&link).unwrap_or(link);
        Workspace { root, output_dir }
    }

    /// A workspace with an explicit output directory, for tests.
    pub fn with_output_dir(root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Workspace {
            root: root.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Fallback module name: the workspace directory basename.
    pub fn basename(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".to_string())
    }
}

/// Which pipeline phase an adapter implements, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnalysisPhase {
    BazelQuery,
    CompileDeps,
    Symbols,
    FileDiscovery,
    Binaries,
}

impl AnalysisPhase {
    pub const ALL: [AnalysisPhase; 5] = [
        AnalysisPhase::BazelQuery,
        AnalysisPhase::CompileDeps,
        AnalysisPhase::Symbols,
        AnalysisPhase::FileDiscovery,
        AnalysisPhase::Binaries,
    ];

    /// Only the bazel query aborts a run when it fails.
    pub fn is_mandatory(self) -> bool {
        self == AnalysisPhase::BazelQuery
    }
}

/// What one phase contributes to the module. `None` fields mean "this
/// phase does not own that data"; `Some` overwrites the prior value.
#[derive(Debug, Default)]
pub struct PartialGraph {
    pub module_name: Option<String>,
    /// Full target table; only the bazel query sets this.
    pub targets: Option<BTreeMap<NodeId, Target>>,
    pub edges: Vec<Edge>,
    pub file_edges: Vec<Edge>,
    /// Edge types this phase owns; the merger drops the prior module's
    /// edges of these types before appending.
    pub replaces: Vec<EdgeType>,
    pub uncovered: Option<BTreeSet<String>>,
    pub system_libraries: Option<BTreeSet<String>>,
}

/// A source adapter: runs one external tool and turns its output into a
/// partial graph. Cancellation must propagate into spawned processes.
#[async_trait]
pub trait Source: Send + Sync {
    fn phase(&self) -> AnalysisPhase;

    async fn run(
        &self,
        cancel: &CancellationToken,
        workspace: &Workspace,
        module: &Module,
    ) -> Result<PartialGraph, SourceError>;
}

/// Map every workspace-relative source/header path to the target
/// claiming it. Shared by the `.d` and `nm` adapters.
pub(crate) fn path_to_target_index(module: &Module) -> BTreeMap<String, NodeId> {
    let mut index = BTreeMap::new();
    for target in module.targets.values() {
        for rel in target.srcs.iter().chain(&target.hdrs) {
            index.insert(target.workspace_rel(rel), target.id());
        }
    }
    index
}

/// File-level node id for a workspace-relative path: the claiming
/// target's file when known, otherwise an uncovered id.
pub(crate) fn file_node_id(
    path: &str,
    index: &BTreeMap<String, NodeId>,
    module: &Module,
) -> NodeId {
    match index.get(path) {
        Some(target_id) => {
            let target = &module.targets[target_id];
            let pkg = target.package.as_str().trim_start_matches('/');
            let rel = path.strip_prefix(&format!("{pkg}/")).unwrap_or(path);
            NodeId::file(target_id, rel)
        }
        None => NodeId::uncovered(path),
    }
}

/// Recursively collect files under `root` matching `keep`, checking for
/// cancellation between directories.
pub(crate) fn walk_files(
    root: &Path,
    cancel: &CancellationToken,
    keep: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, SourceError> {
    use std::collections::VecDeque;

    let mut out = Vec::new();
    let mut queue = VecDeque::from([root.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!("cannot read {}: {err}", dir.display());
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                queue.push_back(path);
            } else if keep(&path) {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}
