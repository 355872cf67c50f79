//! Lattice Sources — external-tool adapters and the module merger

pub mod bazel;
pub mod binaries;
pub mod dotd;
pub mod error;
pub mod files;
pub mod merge;
pub mod nm;
pub mod process;
pub mod source;

pub use bazel::BazelQuerySource;
pub use binaries::BinarySource;
pub use dotd::CompileDepsSource;
pub use error::SourceError;
pub use files::FileDiscoverySource;
pub use merge::merge;
pub use nm::SymbolSource;
pub use source::{AnalysisPhase, PartialGraph, Source, Workspace};
