//! Lattice Watcher — filesystem watching and debounced re-analysis triggers

pub mod debounce;
pub mod watcher;

pub use debounce::{run_debouncer, ChangeGroup, DebounceConfig, Debouncer};
pub use watcher::{ChangeType, FileChange, WorkspaceWatcher};
