//! File discovery: workspace files no target claims

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lattice_core::Module;

use crate::error::SourceError;
use crate::process::run_tool;
use crate::source::{AnalysisPhase, PartialGraph, Source, Workspace};

pub struct FileDiscoverySource;

#[async_trait]
impl Source for FileDiscoverySource {
    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::FileDiscovery
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        workspace: &Workspace,
        module: &Module,
    ) -> Result<PartialGraph, SourceError> {
        let listing = match run_tool(cancel, &workspace.root, "git", &["ls-files"]).await {
            Ok(listing) => listing.lines().map(str::to_string).collect(),
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                tracing::debug!("git ls-files unavailable ({err}), walking instead");
                walk_workspace(cancel, &workspace.root)?
            }
        };

        let claimed: BTreeSet<String> = module
            .targets
            .values()
            .flat_map(|t| {
                t.srcs
                    .iter()
                    .chain(&t.hdrs)
                    .map(move |rel| t.workspace_rel(rel))
            })
            .collect();

        let uncovered: BTreeSet<String> = listing
            .into_iter()
            .filter(|path| is_cxx_file(path) && !claimed.contains(path))
            .collect();
        tracing::debug!("{} uncovered C/C++ files", uncovered.len());

        Ok(PartialGraph {
            uncovered: Some(uncovered),
            ..PartialGraph::default()
        })
    }
}

fn is_cxx_file(path: &str) -> bool {
    matches!(
        Path::new(path).extension().and_then(|e| e.to_str()),
        Some("cc" | "cpp" | "cxx" | "h" | "hh" | "hpp")
    )
}

/// Fallback when the workspace is not a git checkout: an ignore-aware
/// walk with the same output shape as `git ls-files`.
fn walk_workspace(cancel: &CancellationToken, root: &Path) -> Result<Vec<String>, SourceError> {
    let mut out = Vec::new();
    for entry in ignore::WalkBuilder::new(root).build() {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            out.push(rel.to_string_lossy().to_string());
        }
    }
    out.sort();
    Ok(out)
}
