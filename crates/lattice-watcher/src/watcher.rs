//! Filesystem watcher: BUILD files and build outputs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use lattice_sources::{AnalysisPhase, Workspace};

/// What kind of file changed. The variant order is the flush order:
/// most impactful first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeType {
    BuildFile,
    DFile,
    OFile,
}

impl ChangeType {
    /// Classify an event path by filename; anything else is dropped.
    pub fn classify(path: &Path) -> Option<ChangeType> {
        let name = path.file_name()?.to_str()?;
        if name == "BUILD" || name == "BUILD.bazel" {
            return Some(ChangeType::BuildFile);
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("d") => Some(ChangeType::DFile),
            Some("o") => Some(ChangeType::OFile),
            _ => None,
        }
    }

    /// Which phases a change of this type requires.
    pub fn phases(self) -> Vec<AnalysisPhase> {
        match self {
            ChangeType::BuildFile => vec![
                AnalysisPhase::BazelQuery,
                AnalysisPhase::CompileDeps,
                AnalysisPhase::Symbols,
                AnalysisPhase::Binaries,
            ],
            ChangeType::DFile => vec![
                AnalysisPhase::CompileDeps,
                AnalysisPhase::Symbols,
                AnalysisPhase::Binaries,
            ],
            ChangeType::OFile => vec![AnalysisPhase::Symbols, AnalysisPhase::Binaries],
        }
    }
}

/// A classified filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub change_type: ChangeType,
    pub path: PathBuf,
}

/// Watches every directory carrying a BUILD file plus the build-output
/// directory (already dereferenced by the workspace). Dropping the
/// watcher stops the OS watches.
pub struct WorkspaceWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<FileChange>,
    watched_dirs: usize,
}

impl WorkspaceWatcher {
    pub fn new(workspace: &Workspace) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if !matches!(
                            event.kind,
                            notify::EventKind::Create(_)
                                | notify::EventKind::Modify(_)
                                | notify::EventKind::Remove(_)
                        ) {
                            return;
                        }
                        for path in event.paths {
                            if let Some(change_type) = ChangeType::classify(&path) {
                                debug!("classified {:?} as {:?}", path, change_type);
                                let _ = tx.send(FileChange { change_type, path });
                            }
                        }
                    }
                    Err(err) => error!("watch error: {err}"),
                }
            })?;

        let mut watched_dirs = 0;
        for dir in build_file_dirs(&workspace.root) {
            if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                debug!("cannot watch {}: {err}", dir.display());
            } else {
                watched_dirs += 1;
            }
        }
        if workspace.output_dir.is_dir() {
            watcher.watch(&workspace.output_dir, RecursiveMode::Recursive)?;
            watched_dirs += 1;
        }
        info!("watching {watched_dirs} directories under {}", workspace.root.display());

        Ok(WorkspaceWatcher {
            _watcher: watcher,
            rx,
            watched_dirs,
        })
    }

    /// The next classified change, or `None` once cancelled.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Option<FileChange> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            change = self.rx.recv() => change,
        }
    }

    pub fn watched_dirs(&self) -> usize {
        self.watched_dirs
    }
}

/// Every directory under `root` containing a `BUILD` or `BUILD.bazel`,
/// skipping bazel's own output symlinks and hidden directories.
fn build_file_dirs(root: &Path) -> BTreeSet<PathBuf> {
    let mut dirs = BTreeSet::new();
    let mut queue = vec![root.to_path_buf()];
    while let Some(dir) = queue.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if path.is_dir() {
                if name.starts_with('.') || name.starts_with("bazel-") {
                    continue;
                }
                queue.push(path);
            } else if name == "BUILD" || name == "BUILD.bazel" {
                dirs.insert(dir.clone());
            }
        }
    }
    dirs
}
