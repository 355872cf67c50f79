//! Canonical node identifiers and hierarchy derivation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix marking a workspace file that no target claims.
pub const UNCOVERED_PREFIX: &str = "uncovered:";

/// Canonical, stable identifier for a node. The string form is the wire
/// form; every structural fact (family, parent, package) derives from it.
///
/// Families:
/// - package:        `//path/to/pkg` (no colon after the `//`)
/// - target:         `//path/to/pkg:name` (one colon)
/// - file:           `//path/to/pkg:name:rel/path.cc` (two colons)
/// - external:       `@repo//:name` and `@repo//:name:path`, same colon rules
/// - uncovered file: `uncovered:<workspace-relative-path>`
/// - system library: a bare name from linker flags (`dl`, `pthread`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

/// Which of the id families a `NodeId` belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFamily {
    Package,
    Target,
    File,
    UncoveredFile,
    SystemLibrary,
}

/// Position in the package → target → file hierarchy.
/// Uncovered files sit at file level directly under their package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HierarchyLevel {
    Package = 1,
    Target = 2,
    File = 3,
}

impl NodeId {
    /// Wrap an already-canonical id string.
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    /// Id of the package at `path` (workspace-relative, no leading slashes).
    pub fn package(path: &str) -> Self {
        NodeId(format!("//{}", path.trim_matches('/')))
    }

    /// Id of target `name` inside the package id `package` (e.g. `//a/b`).
    pub fn target(package: &str, name: &str) -> Self {
        NodeId(format!("{package}:{name}"))
    }

    /// Id of a file belonging to a target, `rel` being package-relative.
    pub fn file(target: &NodeId, rel: &str) -> Self {
        NodeId(format!("{}:{rel}", target.0))
    }

    /// Id of an uncovered workspace file.
    pub fn uncovered(workspace_rel: &str) -> Self {
        NodeId(format!("{UNCOVERED_PREFIX}{workspace_rel}"))
    }

    /// Id of a system library surfaced from linker flags.
    pub fn system_library(name: &str) -> Self {
        NodeId(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify this id into its family.
    pub fn family(&self) -> IdFamily {
        if self.0.starts_with(UNCOVERED_PREFIX) {
            return IdFamily::UncoveredFile;
        }
        let Some(rest) = self.label_rest() else {
            return IdFamily::SystemLibrary;
        };
        match rest.matches(':').count() {
            0 => IdFamily::Package,
            1 => IdFamily::Target,
            _ => IdFamily::File,
        }
    }

    /// Hierarchy level of this id. System libraries participate at target
    /// level: they have no package and no children.
    pub fn level(&self) -> HierarchyLevel {
        match self.family() {
            IdFamily::Package => HierarchyLevel::Package,
            IdFamily::Target | IdFamily::SystemLibrary => HierarchyLevel::Target,
            IdFamily::File | IdFamily::UncoveredFile => HierarchyLevel::File,
        }
    }

    /// The hierarchical parent, derived purely from the id.
    /// Files resolve to their target, targets to their package, uncovered
    /// files to the package named by their directory path. Packages and
    /// system libraries have no parent.
    pub fn parent(&self) -> Option<NodeId> {
        match self.family() {
            IdFamily::Package | IdFamily::SystemLibrary => None,
            IdFamily::Target | IdFamily::File => {
                let cut = self.0.rfind(':')?;
                Some(NodeId(self.0[..cut].to_string()))
            }
            IdFamily::UncoveredFile => {
                let path = &self.0[UNCOVERED_PREFIX.len()..];
                let dir = match path.rfind('/') {
                    Some(cut) => &path[..cut],
                    None => "",
                };
                Some(NodeId::package(dir))
            }
        }
    }

    /// The package this id lives in, walking parents as needed.
    /// Returns the id itself for packages, `None` for system libraries.
    pub fn package_id(&self) -> Option<NodeId> {
        let mut current = self.clone();
        loop {
            if current.family() == IdFamily::Package {
                return Some(current);
            }
            current = current.parent()?;
        }
    }

    /// Whether this id refers to an external-repository label (`@repo//...`).
    pub fn is_external(&self) -> bool {
        self.0.starts_with('@')
    }

    /// The label body after the repository marker: for `//a:b` that is
    /// `a:b`, for `@r//:n` it is `:n`. `None` when there is no `//`.
    fn label_rest(&self) -> Option<&str> {
        if let Some(rest) = self.0.strip_prefix("//") {
            Some(rest)
        } else if self.0.starts_with('@') {
            let cut = self.0.find("//")?;
            Some(&self.0[cut + 2..])
        } else {
            None
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_classification() {
        assert_eq!(NodeId::from("//a/b").family(), IdFamily::Package);
        assert_eq!(NodeId::from("//a/b:lib").family(), IdFamily::Target);
        assert_eq!(NodeId::from("//a/b:lib:src/f.cc").family(), IdFamily::File);
        assert_eq!(NodeId::from("@zlib//:z").family(), IdFamily::Target);
        assert_eq!(NodeId::from("@zlib//:z:inc/z.h").family(), IdFamily::File);
        assert_eq!(
            NodeId::from("uncovered:util/orphaned.cc").family(),
            IdFamily::UncoveredFile
        );
        assert_eq!(NodeId::from("pthread").family(), IdFamily::SystemLibrary);
    }

    #[test]
    fn parent_strips_last_colon_segment() {
        assert_eq!(
            NodeId::from("//a/b:lib:src/f.cc").parent(),
            Some(NodeId::from("//a/b:lib"))
        );
        assert_eq!(NodeId::from("//a/b:lib").parent(), Some(NodeId::from("//a/b")));
        assert_eq!(NodeId::from("//a/b").parent(), None);
        assert_eq!(NodeId::from("@zlib//:z").parent(), Some(NodeId::from("@zlib//")));
        assert_eq!(NodeId::from("pthread").parent(), None);
    }

    #[test]
    fn uncovered_parent_is_directory_package() {
        assert_eq!(
            NodeId::from("uncovered:util/orphaned.cc").parent(),
            Some(NodeId::from("//util"))
        );
        assert_eq!(
            NodeId::from("uncovered:a/b/c.h").parent(),
            Some(NodeId::from("//a/b"))
        );
        // A root-level stray file belongs to the root package.
        assert_eq!(
            NodeId::from("uncovered:orphan.cc").parent(),
            Some(NodeId::from("//"))
        );
    }

    #[test]
    fn package_id_walks_to_package_level() {
        assert_eq!(
            NodeId::from("//a/b:lib:src/f.cc").package_id(),
            Some(NodeId::from("//a/b"))
        );
        assert_eq!(NodeId::from("//a/b:lib").package_id(), Some(NodeId::from("//a/b")));
        assert_eq!(NodeId::from("//a/b").package_id(), Some(NodeId::from("//a/b")));
        assert_eq!(NodeId::from("dl").package_id(), None);
    }

    #[test]
    fn parent_chain_is_consistent_across_levels() {
        // Parsing any descendant and taking repeated parents reaches the
        // same package as parsing the package id directly.
        let file = NodeId::from("//x/y:t:gen/f.h");
        let target = file.parent().unwrap();
        let package = target.parent().unwrap();
        assert_eq!(package, NodeId::from("//x/y"));
        assert_eq!(file.package_id().unwrap(), package);
        assert_eq!(target.package_id().unwrap(), package);
    }

    #[test]
    fn levels() {
        assert_eq!(NodeId::from("//a").level(), HierarchyLevel::Package);
        assert_eq!(NodeId::from("//a:t").level(), HierarchyLevel::Target);
        assert_eq!(NodeId::from("//a:t:f.cc").level(), HierarchyLevel::File);
        assert_eq!(NodeId::from("uncovered:a/f.cc").level(), HierarchyLevel::File);
        assert_eq!(NodeId::from("m").level(), HierarchyLevel::Target);
    }
}
