//! Binary-derive adapter: dynamic-library listings and linkopts

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use lattice_core::{Edge, EdgeType, Module, NodeId, NodeKind};

use crate::error::SourceError;
use crate::process::run_tool;
use crate::source::{AnalysisPhase, PartialGraph, Source, Workspace};

pub struct BinarySource;

#[async_trait]
impl Source for BinarySource {
    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::Binaries
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        workspace: &Workspace,
        module: &Module,
    ) -> Result<PartialGraph, SourceError> {
        let mut partial = PartialGraph::default();
        let mut system_libraries = BTreeSet::new();

        // Linker flags name system libraries directly.
        for target in module.targets.values() {
            for opt in &target.linkopts {
                if let Some(name) = opt.strip_prefix("-l") {
                    if name.is_empty() {
                        continue;
                    }
                    system_libraries.insert(name.to_string());
                    partial.edges.push(Edge::new(
                        target.id(),
                        NodeId::system_library(name),
                        EdgeType::Dynamic,
                    ));
                }
            }
        }

        // Shared-library targets, by the soname they build.
        let shared_by_name: BTreeMap<String, NodeId> = module
            .targets
            .values()
            .filter(|t| t.kind == NodeKind::CcSharedLibrary)
            .map(|t| (t.name.clone(), t.id()))
            .collect();

        for target in module.targets.values() {
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            if !matches!(target.kind, NodeKind::CcBinary | NodeKind::CcSharedLibrary) {
                continue;
            }
            let Some(artifact) = built_artifact(workspace, target) else {
                tracing::debug!("no built artifact for {}", target.id());
                continue;
            };
            let listing = match list_dynamic_libraries(cancel, workspace, &artifact).await {
                Ok(listing) => listing,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    tracing::warn!("dynamic listing failed for {}: {err}", artifact.display());
                    continue;
                }
            };
            for path in parse_library_lines(&listing) {
                let name = soname_to_name(&path);
                if name.is_empty() {
                    continue;
                }
                match shared_by_name.get(&name) {
                    Some(shared_target) if *shared_target != target.id() => {
                        partial.edges.push(Edge::new(
                            target.id(),
                            shared_target.clone(),
                            EdgeType::Dynamic,
                        ));
                    }
                    Some(_) => {}
                    None => {
                        system_libraries.insert(name.clone());
                        partial.edges.push(Edge::new(
                            target.id(),
                            NodeId::system_library(&name),
                            EdgeType::Dynamic,
                        ));
                    }
                }
            }
        }
        partial.system_libraries = Some(system_libraries);
        Ok(partial)
    }
}

/// Where bazel puts a target's built binary or shared library.
fn built_artifact(workspace: &Workspace, target: &lattice_core::Target) -> Option<PathBuf> {
    let pkg = target.package.as_str().trim_start_matches('/');
    let dir = if pkg.is_empty() {
        workspace.output_dir.clone()
    } else {
        workspace.output_dir.join(pkg)
    };
    let candidates = match target.kind {
        NodeKind::CcBinary => vec![target.name.clone()],
        NodeKind::CcSharedLibrary => vec![
            format!("lib{}.so", target.name),
            format!("{}.so", target.name),
            format!("lib{}.dylib", target.name),
        ],
        _ => return None,
    };
    candidates
        .into_iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// `ldd` on Linux, `otool -L` on macOS.
async fn list_dynamic_libraries(
    cancel: &CancellationToken,
    workspace: &Workspace,
    artifact: &std::path::Path,
) -> Result<String, SourceError> {
    let artifact = artifact.to_string_lossy();
    if cfg!(target_os = "macos") {
        run_tool(cancel, &workspace.root, "otool", &["-L", artifact.as_ref()]).await
    } else {
        run_tool(cancel, &workspace.root, "ldd", &[artifact.as_ref()]).await
    }
}

/// Extract library paths from lines shaped like `lib => /path (addr)`
/// (ldd) and `/path (compatibility version …)` (otool).
fn parse_library_lines(listing: &str) -> Vec<String> {
    let arrow = Regex::new(r"^\s*\S+\s*=>\s*(\S+)\s*\(").expect("static regex");
    let bare = Regex::new(r"^\s*(/\S+)\s*\(").expect("static regex");
    let mut out = Vec::new();
    for line in listing.lines() {
        if let Some(captures) = arrow.captures(line) {
            out.push(captures[1].to_string());
        } else if let Some(captures) = bare.captures(line) {
            out.push(captures[1].to_string());
        }
    }
    out
}

/// `/lib/x86_64/libm.so.6` → `m`; `libfoo.dylib` → `foo`.
fn soname_to_name(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    let base = base.split(".so").next().unwrap_or(base);
    let base = base.strip_suffix(".dylib").unwrap_or(base);
    base.strip_prefix("lib").unwrap_or(base).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::Target;

    #[test]
    fn ldd_and_otool_lines_parse() {
        let ldd = "\tlinux-vdso.so.1 (0x00007ffd0b3f9000)\n\
                   \tlibm.so.6 => /lib/x86_64-linux-gnu/libm.so.6 (0x00007f8e1c000000)\n\
                   \t/lib64/ld-linux-x86-64.so.2 (0x00007f8e1c400000)\n";
        assert_eq!(
            parse_library_lines(ldd),
            vec![
                "/lib/x86_64-linux-gnu/libm.so.6".to_string(),
                "/lib64/ld-linux-x86-64.so.2".to_string(),
            ]
        );

        let otool = "bazel-bin/app/main:\n\
                     \t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1319.0.0)\n";
        assert_eq!(
            parse_library_lines(otool),
            vec!["/usr/lib/libSystem.B.dylib".to_string()]
        );
    }

    #[test]
    fn soname_normalisation() {
        assert_eq!(soname_to_name("/lib/x86_64/libm.so.6"), "m");
        assert_eq!(soname_to_name("libpthread.so.0"), "pthread");
        assert_eq!(soname_to_name("/usr/lib/libSystem.B.dylib"), "System.B");
        assert_eq!(soname_to_name("libz.dylib"), "z");
    }

    #[tokio::test]
    async fn linkopts_surface_system_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let mut module = Module::new("m", dir.path());
        let mut target = Target::new(NodeId::package("a"), "x", NodeKind::CcLibrary);
        target.linkopts = vec!["-ldl".to_string(), "-Wl,-rpath".to_string()];
        module.add_target(target);

        let workspace = Workspace::with_output_dir(dir.path(), dir.path().join("out"));
        let cancel = CancellationToken::new();
        let partial = BinarySource.run(&cancel, &workspace, &module).await.unwrap();

        let libs = partial.system_libraries.unwrap();
        assert_eq!(libs.into_iter().collect::<Vec<_>>(), vec!["dl".to_string()]);
        assert_eq!(partial.edges.len(), 1);
        assert_eq!(partial.edges[0].to, NodeId::from("dl"));
        assert_eq!(partial.edges[0].edge_type, EdgeType::Dynamic);
    }
}
