//! Compile-deps adapter: `.d` dependency files → compile edges

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lattice_core::{Edge, EdgeType, Module};

use crate::error::SourceError;
use crate::source::{
    file_node_id, path_to_target_index, walk_files, AnalysisPhase, PartialGraph, Source, Workspace,
};

pub struct CompileDepsSource;

#[async_trait]
impl Source for CompileDepsSource {
    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::CompileDeps
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        workspace: &Workspace,
        module: &Module,
    ) -> Result<PartialGraph, SourceError> {
        let dotd_files = walk_files(&workspace.output_dir, cancel, |path| is_simple_dotd(path))?;
        tracing::debug!("found {} .d files under {}", dotd_files.len(), workspace.output_dir.display());

        let index = path_to_target_index(module);
        let mut partial = PartialGraph {
            replaces: vec![EdgeType::Compile],
            ..PartialGraph::default()
        };

        for path in dotd_files {
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(err) => {
                    tracing::warn!("cannot read {}: {err}", path.display());
                    continue;
                }
            };
            let Some(parsed) = parse_dotd(&content, &workspace.output_dir) else {
                continue;
            };
            for dep in &parsed.deps {
                if let (Some(from_target), Some(to_target)) =
                    (index.get(&parsed.source), index.get(dep))
                {
                    if from_target != to_target {
                        partial.edges.push(Edge::new(
                            from_target.clone(),
                            to_target.clone(),
                            EdgeType::Compile,
                        ));
                    }
                }
                partial.file_edges.push(Edge::new(
                    file_node_id(&parsed.source, &index, module),
                    file_node_id(dep, &index, module),
                    EdgeType::Compile,
                ));
            }
        }
        Ok(partial)
    }
}

/// A simple `.d` file has exactly one dot in its basename; variants like
/// `foo.pic.d` describe alternate compilations of the same source.
fn is_simple_dotd(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.ends_with(".d") && name.matches('.').count() == 1)
}

#[derive(Debug, PartialEq)]
struct DotdRule {
    /// Workspace-relative path of the compiled source.
    source: String,
    /// Workspace-relative dependency paths (headers, other sources).
    deps: Vec<String>,
}

/// Parse a Makefile-style rule `target.o: dep1 dep2 \` with line
/// continuations. System and generated paths are discarded; the first
/// workspace-relative file with a source extension is the source, the
/// rest are its dependencies.
fn parse_dotd(content: &str, output_dir: &Path) -> Option<DotdRule> {
    let joined = content.replace("\\\r\n", " ").replace("\\\n", " ");
    let rest = joined.splitn(2, ':').nth(1)?;

    let output_str = output_dir.to_string_lossy();
    let mut source: Option<String> = None;
    let mut deps = Vec::new();
    for token in rest.split_whitespace() {
        if token.starts_with('/')
            || token.starts_with("external/")
            || token.starts_with("bazel-out/")
            || token.starts_with(output_str.as_ref())
        {
            continue;
        }
        if source.is_none() && has_source_extension(token) {
            source = Some(token.to_string());
        } else {
            deps.push(token.to_string());
        }
    }
    source.map(|source| DotdRule { source, deps })
}

fn has_source_extension(path: &str) -> bool {
    matches!(
        Path::new(path).extension().and_then(|e| e.to_str()),
        Some("cc" | "cpp")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn simple_dotd_detection() {
        assert!(is_simple_dotd(Path::new("/out/a/_objs/x/x.d")));
        assert!(!is_simple_dotd(Path::new("/out/a/_objs/x/x.pic.d")));
        assert!(!is_simple_dotd(Path::new("/out/a/x.o")));
    }

    #[test]
    fn parses_continuations_and_classifies_paths() {
        let content = "bazel-out/k8/bin/a/_objs/x/x.o: a/x.cc \\\n  a/x.h \\\n  b/z.h \\\n  /usr/include/stdio.h \\\n  external/zlib/zlib.h\n";
        let rule = parse_dotd(content, &PathBuf::from("/out")).unwrap();
        assert_eq!(rule.source, "a/x.cc");
        assert_eq!(rule.deps, vec!["a/x.h", "b/z.h"]);
    }

    #[test]
    fn rule_without_workspace_source_is_skipped() {
        let content = "x.o: /usr/include/stdio.h external/zlib/zlib.h\n";
        assert!(parse_dotd(content, &PathBuf::from("/out")).is_none());
    }

    #[tokio::test]
    async fn emits_target_and_file_level_edges() {
        use lattice_core::{NodeId, NodeKind, Target};
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(out.join("a/_objs/x")).unwrap();
        std::fs::write(
            out.join("a/_objs/x/x.d"),
            "a/_objs/x/x.o: a/x.cc a/x.h b/z.h stray/own.h\n",
        )
        .unwrap();

        let mut module = Module::new("m", dir.path());
        let mut x = Target::new(NodeId::package("a"), "x", NodeKind::CcLibrary);
        x.srcs = vec!["x.cc".to_string()];
        x.hdrs = vec!["x.h".to_string()];
        module.add_target(x);
        let mut z = Target::new(NodeId::package("b"), "z", NodeKind::CcLibrary);
        z.hdrs = vec!["z.h".to_string()];
        module.add_target(z);

        let workspace = Workspace::with_output_dir(dir.path(), &out);
        let cancel = CancellationToken::new();
        let partial = CompileDepsSource
            .run(&cancel, &workspace, &module)
            .await
            .unwrap();

        // Target-level: only the cross-target pair surfaces.
        assert_eq!(partial.edges.len(), 1);
        assert_eq!(partial.edges[0].from, NodeId::from("//a:x"));
        assert_eq!(partial.edges[0].to, NodeId::from("//b:z"));
        assert_eq!(partial.edges[0].edge_type, EdgeType::Compile);

        // File-level: every pair is recorded, unknown files as uncovered.
        assert_eq!(partial.file_edges.len(), 3);
        assert!(partial
            .file_edges
            .iter()
            .any(|e| e.to == NodeId::from("uncovered:stray/own.h")));
        assert!(partial
            .file_edges
            .iter()
            .all(|e| e.from == NodeId::from("//a:x:x.cc")));
    }
}
