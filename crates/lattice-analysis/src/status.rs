//! Workspace status payloads published on the bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lattice_sources::AnalysisPhase;

/// Topic carrying analysis progress; latest-only.
pub const TOPIC_WORKSPACE_STATUS: &str = "workspace_status";
/// Topic announcing module replacements; latest-only.
pub const TOPIC_TARGET_GRAPH: &str = "target_graph";

/// Where the pipeline currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceState {
    Initializing,
    BazelQuerying,
    AnalyzingDeps,
    AnalyzingSymbols,
    DiscoveringFiles,
    AnalyzingBinaries,
    TargetsReady,
    Watching,
    Ready,
    Error,
}

impl WorkspaceState {
    pub fn for_phase(phase: AnalysisPhase) -> Self {
        match phase {
            AnalysisPhase::BazelQuery => WorkspaceState::BazelQuerying,
            AnalysisPhase::CompileDeps => WorkspaceState::AnalyzingDeps,
            AnalysisPhase::Symbols => WorkspaceState::AnalyzingSymbols,
            AnalysisPhase::FileDiscovery => WorkspaceState::DiscoveringFiles,
            AnalysisPhase::Binaries => WorkspaceState::AnalyzingBinaries,
        }
    }
}

/// The `workspace_status` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceStatus {
    pub state: WorkspaceState,
    pub message: String,
    pub step: u32,
    pub total: u32,
    pub timestamp: DateTime<Utc>,
}

impl WorkspaceStatus {
    pub fn new(state: WorkspaceState, message: impl Into<String>, step: u32, total: u32) -> Self {
        WorkspaceStatus {
            state,
            message: message.into(),
            step,
            total,
            timestamp: Utc::now(),
        }
    }
}

/// The `target_graph` payload: enough for clients to decide to re-render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGraphUpdate {
    pub complete: bool,
    pub target_count: usize,
    pub edge_count: usize,
    pub issue_count: usize,
}
