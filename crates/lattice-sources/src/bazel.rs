//! Bazel query adapter: targets, declared edges, external labels

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lattice_core::{Edge, EdgeType, Module, NodeId, NodeKind, Target};

use crate::error::SourceError;
use crate::process::run_tool;
use crate::source::{AnalysisPhase, PartialGraph, Source, Workspace};

/// The workspace-wide query for C/C++ target kinds.
const CC_KINDS_QUERY: &str = "kind('cc_binary|cc_shared_library|cc_library', //...)";

/// External repositories that are bazel plumbing, not dependencies.
const SKIPPED_REPOS: &[&str] = &["@bazel_tools//", "@platforms//"];

pub struct BazelQuerySource;

#[async_trait]
impl Source for BazelQuerySource {
    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::BazelQuery
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        workspace: &Workspace,
        _module: &Module,
    ) -> Result<PartialGraph, SourceError> {
        let xml = run_tool(
            cancel,
            &workspace.root,
            "bazel",
            &["query", CC_KINDS_QUERY, "--output=xml"],
        )
        .await?;
        let rules = parse_query_xml(&xml)?;

        let external_labels = collect_external_labels(&rules);
        let external_rules = if external_labels.is_empty() {
            Vec::new()
        } else {
            let expr = external_labels
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(" + ");
            match run_tool(cancel, &workspace.root, "bazel", &["query", &expr, "--output=xml"])
                .await
            {
                Ok(xml) => parse_query_xml(&xml).unwrap_or_else(|err| {
                    tracing::warn!("external label query unparsable: {err}");
                    Vec::new()
                }),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    tracing::warn!("external label query failed: {err}");
                    Vec::new()
                }
            }
        };

        let module_name = match query_module_name(cancel, workspace).await {
            Ok(Some(name)) => name,
            Ok(None) => workspace.basename(),
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                tracing::warn!("module name query failed: {err}");
                workspace.basename()
            }
        };

        Ok(assemble(module_name, rules, external_rules, external_labels))
    }
}

/// One `<rule>` element of the query output.
#[derive(Debug, Default, Clone)]
struct RawRule {
    class: String,
    name: String,
    lists: BTreeMap<String, Vec<String>>,
}

impl RawRule {
    fn list(&self, name: &str) -> &[String] {
        self.lists.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Bazel emits an XML 1.1 prolog that strict parsers reject; normalise
/// the version declaration before parsing.
fn normalise_xml_version(xml: &str) -> String {
    xml.replacen("<?xml version=\"1.1\"", "<?xml version=\"1.0\"", 1)
}

fn parse_query_xml(xml: &str) -> Result<Vec<RawRule>, SourceError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let xml = normalise_xml_version(xml);
    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);

    let mut rules = Vec::new();
    let mut current: Option<RawRule> = None;
    let mut current_list: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let attr = |key: &str| -> Option<String> {
                    e.attributes().flatten().find_map(|a| {
                        (String::from_utf8_lossy(a.key.as_ref()) == key)
                            .then(|| String::from_utf8_lossy(&a.value).to_string())
                    })
                };
                match name.as_str() {
                    "rule" => {
                        current = Some(RawRule {
                            class: attr("class").unwrap_or_default(),
                            name: attr("name").unwrap_or_default(),
                            lists: BTreeMap::new(),
                        });
                    }
                    "list" => {
                        current_list = attr("name");
                    }
                    "label" | "string" => {
                        if let (Some(rule), Some(list)) = (current.as_mut(), current_list.as_ref())
                        {
                            if let Some(value) = attr("value") {
                                rule.lists.entry(list.clone()).or_default().push(value);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"rule" => {
                    if let Some(rule) = current.take() {
                        rules.push(rule);
                    }
                }
                b"list" => current_list = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(SourceError::Parse(format!("query xml: {err}"))),
        }
    }
    Ok(rules)
}

/// Distinct `@repo//...` labels referenced from the workspace rules,
/// minus bazel's own plumbing repositories.
fn collect_external_labels(rules: &[RawRule]) -> BTreeSet<String> {
    let mut labels = BTreeSet::new();
    for rule in rules {
        for list in ["deps", "dynamic_deps", "data"] {
            for label in rule.list(list) {
                if !label.starts_with('@') {
                    continue;
                }
                if SKIPPED_REPOS.iter().any(|skip| label.starts_with(skip))
                    || label.starts_with("@local_config_")
                {
                    continue;
                }
                labels.insert(label.clone());
            }
        }
    }
    labels
}

/// `bazel mod graph` prints `<root> (name@version)`; extract the name.
async fn query_module_name(
    cancel: &CancellationToken,
    workspace: &Workspace,
) -> Result<Option<String>, SourceError> {
    let output = run_tool(cancel, &workspace.root, "bazel", &["mod", "graph"]).await?;
    let pattern = regex::Regex::new(r"<root> \(([^@)]+)@").expect("static regex");
    Ok(pattern
        .captures(&output)
        .map(|captures| captures[1].to_string()))
}

/// Normalise a bazel label to a target id: `//b` means `//b:b`.
fn label_to_target_id(label: &str) -> NodeId {
    let body = match label.find("//") {
        Some(cut) => &label[cut + 2..],
        None => label,
    };
    if body.contains(':') {
        NodeId::new(label)
    } else {
        let name = body.rsplit('/').next().unwrap_or(body);
        NodeId::new(format!("{label}:{name}"))
    }
}

/// Package-relative path of a file label within `package`; labels from
/// other packages (generated files) are kept verbatim.
fn file_rel(label: &str, package: &NodeId) -> String {
    let prefix = format!("{}:", package.as_str());
    match label.strip_prefix(&prefix) {
        Some(rel) => rel.to_string(),
        None => label.rsplit(':').next().unwrap_or(label).to_string(),
    }
}

fn kind_of_class(class: &str) -> Option<NodeKind> {
    match class {
        "cc_library" => Some(NodeKind::CcLibrary),
        "cc_binary" => Some(NodeKind::CcBinary),
        "cc_shared_library" => Some(NodeKind::CcSharedLibrary),
        _ => None,
    }
}

fn assemble(
    module_name: String,
    rules: Vec<RawRule>,
    external_rules: Vec<RawRule>,
    external_labels: BTreeSet<String>,
) -> PartialGraph {
    let mut targets: BTreeMap<NodeId, Target> = BTreeMap::new();

    for rule in &rules {
        let Some(kind) = kind_of_class(&rule.class) else {
            continue;
        };
        let id = label_to_target_id(&rule.name);
        let Some(package) = id.package_id() else {
            continue;
        };
        let name = id
            .as_str()
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .to_string();
        let mut target = Target::new(package.clone(), name, kind);
        target.srcs = rule
            .list("srcs")
            .iter()
            .map(|l| file_rel(l, &package))
            .collect();
        target.hdrs = rule
            .list("hdrs")
            .iter()
            .map(|l| file_rel(l, &package))
            .collect();
        target.linkopts = rule.list("linkopts").to_vec();
        target.visibility = rule.list("visibility").to_vec();
        targets.insert(id, target);
    }

    // External labels become bare target nodes with no file children.
    // The follow-up query refines their kind when it succeeds.
    let external_kinds: BTreeMap<NodeId, NodeKind> = external_rules
        .iter()
        .filter_map(|rule| {
            kind_of_class(&rule.class).map(|kind| (label_to_target_id(&rule.name), kind))
        })
        .collect();
    for label in &external_labels {
        let id = label_to_target_id(label);
        let Some(package) = id.package_id() else {
            continue;
        };
        let name = id
            .as_str()
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .to_string();
        let kind = match external_kinds.get(&id) {
            Some(NodeKind::CcSharedLibrary) => NodeKind::CcSharedLibrary,
            _ => NodeKind::External,
        };
        targets.entry(id).or_insert_with(|| Target::new(package, name, kind));
    }

    // Declared edges, typed by the dep target's kind. Plumbing repos
    // never appear in the graph, so edges to them are dropped too.
    let skip = |label: &str| {
        SKIPPED_REPOS.iter().any(|s| label.starts_with(s)) || label.starts_with("@local_config_")
    };
    let mut edges = Vec::new();
    for rule in &rules {
        let from = label_to_target_id(&rule.name);
        for label in rule.list("deps") {
            if skip(label) {
                continue;
            }
            let to = label_to_target_id(label);
            let edge_type = match targets.get(&to).map(|t| t.kind) {
                Some(NodeKind::CcSharedLibrary) => EdgeType::Dynamic,
                Some(NodeKind::CcBinary) => EdgeType::Data,
                // Unknown dep targets default to static linkage.
                _ => EdgeType::Static,
            };
            edges.push(Edge::new(from.clone(), to, edge_type));
        }
        for label in rule.list("dynamic_deps") {
            if !skip(label) {
                edges.push(Edge::new(from.clone(), label_to_target_id(label), EdgeType::Dynamic));
            }
        }
        for label in rule.list("data") {
            if !skip(label) {
                edges.push(Edge::new(from.clone(), label_to_target_id(label), EdgeType::Data));
            }
        }
    }

    PartialGraph {
        module_name: Some(module_name),
        targets: Some(targets),
        edges,
        replaces: vec![EdgeType::Static, EdgeType::Dynamic, EdgeType::Data],
        ..PartialGraph::default()
    }
}
