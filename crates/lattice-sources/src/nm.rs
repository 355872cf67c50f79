//! Symbol adapter: `nm` output → symbol consumption edges

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lattice_core::{
    Edge, EdgeType, Module, NodeId, NodeKind, EDGE_META_LINKAGE, EDGE_META_SYMBOL,
};

use crate::error::SourceError;
use crate::process::run_tool;
use crate::source::{
    file_node_id, path_to_target_index, walk_files, AnalysisPhase, PartialGraph, Source, Workspace,
};

pub struct SymbolSource;

#[async_trait]
impl Source for SymbolSource {
    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::Symbols
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        workspace: &Workspace,
        module: &Module,
    ) -> Result<PartialGraph, SourceError> {
        let objects = walk_files(&workspace.output_dir, cancel, |path| {
            path.extension().and_then(|e| e.to_str()) == Some("o")
        })?;
        tracing::debug!("scanning {} object files", objects.len());

        // Per reconstructed source file: what it defines and consumes.
        let mut files: Vec<(String, ParsedObject)> = Vec::new();
        for object in &objects {
            let Some(source) = object_source_path(object, &workspace.output_dir) else {
                continue;
            };
            let object_path = object.to_string_lossy();
            let listing = match run_tool(cancel, &workspace.root, "nm", &[object_path.as_ref()])
                .await
            {
                Ok(listing) => listing,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    tracing::warn!("nm failed for {}: {err}", object.display());
                    continue;
                }
            };
            files.push((source, parse_nm_listing(&listing)));
        }

        Ok(build_symbol_edges(files, module))
    }
}

#[derive(Debug, Default, PartialEq)]
struct ParsedObject {
    defined: Vec<String>,
    undefined: Vec<String>,
}

/// Symbol types that define the symbol in this object.
fn is_defined_type(symbol_type: char) -> bool {
    matches!(symbol_type, 'T' | 't' | 'D' | 'd' | 'B' | 'b' | 'R' | 'r' | 'W' | 'w')
}

/// One nm line: optional address, a type character, then the name.
/// The name itself may contain spaces (template parameters).
fn parse_nm_line(line: &str) -> Option<(char, &str)> {
    let trimmed = line.trim_end();
    let (head, rest) = match trimmed.split_once(' ') {
        Some(parts) => parts,
        None => return None,
    };
    let (type_token, name) = if head.len() == 1 {
        (head, rest)
    } else {
        // Leading address field; the type is the next token.
        let rest = rest.trim_start();
        rest.split_once(' ')?
    };
    let symbol_type = type_token.chars().next()?;
    if type_token.len() != 1 || !symbol_type.is_ascii_alphabetic() {
        return None;
    }
    let name = name.trim_start();
    (!name.is_empty()).then_some((symbol_type, name))
}

fn parse_nm_listing(listing: &str) -> ParsedObject {
    let mut object = ParsedObject::default();
    for line in listing.lines() {
        let Some((symbol_type, name)) = parse_nm_line(line) else {
            continue;
        };
        if is_defined_type(symbol_type) {
            object.defined.push(name.to_string());
        } else if symbol_type == 'U' {
            object.undefined.push(name.to_string());
        }
    }
    object
}

/// Reconstruct the workspace-relative source path from an object path
/// using the `…/bin/<pkg>/_objs/<target>/<name>.o → <pkg>/<name>.cc`
/// convention.
fn object_source_path(object: &Path, output_dir: &Path) -> Option<String> {
    let rel = object.strip_prefix(output_dir).unwrap_or(object);
    let components: Vec<&str> = rel
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    let objs_at = components.iter().position(|c| *c == "_objs")?;
    let mut pkg = &components[..objs_at];
    if let Some(bin_at) = pkg.iter().rposition(|c| *c == "bin") {
        pkg = &pkg[bin_at + 1..];
    }
    let stem = Path::new(components.last()?).file_stem()?.to_str()?;
    let mut path = pkg.join("/");
    if !path.is_empty() {
        path.push('/');
    }
    path.push_str(stem);
    path.push_str(".cc");
    Some(path)
}

fn build_symbol_edges(files: Vec<(String, ParsedObject)>, module: &Module) -> PartialGraph {
    let index = path_to_target_index(module);

    // Global symbol table: first definer wins (files arrive sorted).
    let mut definers: BTreeMap<&str, &str> = BTreeMap::new();
    for (source, object) in &files {
        for symbol in &object.defined {
            definers.entry(symbol).or_insert(source);
        }
    }

    let mut partial = PartialGraph {
        replaces: vec![EdgeType::Symbol],
        ..PartialGraph::default()
    };

    // Aggregate per endpoint pair: one edge, first symbol named, count.
    let mut file_pairs: BTreeMap<(NodeId, NodeId), (String, Option<&'static str>, u32)> =
        BTreeMap::new();
    let mut target_pairs: BTreeMap<(NodeId, NodeId), (String, String, u32)> = BTreeMap::new();

    for (consumer, object) in &files {
        for symbol in &object.undefined {
            let Some(&definer) = definers.get(symbol.as_str()) else {
                continue;
            };
            if definer == consumer {
                continue;
            }
            let consumer_target = index.get(consumer.as_str());
            let definer_target = index.get(definer);
            let linkage = match (consumer_target, definer_target) {
                (Some(from), Some(to)) if from == to => Some("static"),
                (Some(from), Some(to)) => Some(symbol_linkage(from, to, module)),
                _ => None,
            };

            let from_file = file_node_id(consumer, &index, module);
            let to_file = file_node_id(definer, &index, module);
            file_pairs
                .entry((from_file, to_file))
                .and_modify(|(_, _, count)| *count += 1)
                .or_insert_with(|| (symbol.clone(), linkage, 1));

            let (Some(from_target), Some(to_target)) = (consumer_target, definer_target) else {
                continue;
            };
            if from_target == to_target {
                continue;
            }
            let linkage = symbol_linkage(from_target, to_target, module);
            target_pairs
                .entry((from_target.clone(), to_target.clone()))
                .and_modify(|(_, _, count)| *count += 1)
                .or_insert_with(|| (symbol.clone(), linkage.to_string(), 1));
        }
    }

    for ((from, to), (symbol, linkage, count)) in file_pairs {
        let mut edge = Edge::new(from, to, EdgeType::Symbol)
            .with_metadata(EDGE_META_SYMBOL, symbol)
            .with_metadata("count", count.to_string());
        if let Some(linkage) = linkage {
            edge = edge.with_metadata(EDGE_META_LINKAGE, linkage);
        }
        partial.file_edges.push(edge);
    }
    for ((from, to), (symbol, linkage, count)) in target_pairs {
        partial.edges.push(
            Edge::new(from, to, EdgeType::Symbol)
                .with_metadata(EDGE_META_SYMBOL, symbol)
                .with_metadata(EDGE_META_LINKAGE, linkage)
                .with_metadata("count", count.to_string()),
        );
    }
    partial
}

/// Linkage tag for a cross-target symbol edge. The edge type stays
/// `symbol`; this is metadata only. A shared library on either end makes
/// it dynamic, anything else crosses static link units.
fn symbol_linkage(from: &NodeId, to: &NodeId, module: &Module) -> &'static str {
    let kind_of = |id: &NodeId| module.targets.get(id).map(|t| t.kind);
    if kind_of(from) == Some(NodeKind::CcSharedLibrary)
        || kind_of(to) == Some(NodeKind::CcSharedLibrary)
    {
        "dynamic"
    } else {
        "cross"
    }
}
