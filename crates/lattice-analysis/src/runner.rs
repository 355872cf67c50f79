//! The pipeline driver: serialised runs, progress, phase selection

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use lattice_sources::{
    merge, AnalysisPhase, BazelQuerySource, BinarySource, CompileDepsSource, FileDiscoverySource,
    Source, SymbolSource, Workspace,
};

use crate::broker::Broker;
use crate::holder::ModuleHolder;
use crate::status::{
    TargetGraphUpdate, WorkspaceState, WorkspaceStatus, TOPIC_TARGET_GRAPH, TOPIC_WORKSPACE_STATUS,
};

/// Which phases a run executes, and why.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub phases: Vec<AnalysisPhase>,
    pub reason: String,
}

impl AnalysisOptions {
    /// Everything, in pipeline order.
    pub fn full(reason: impl Into<String>) -> Self {
        AnalysisOptions {
            phases: AnalysisPhase::ALL.to_vec(),
            reason: reason.into(),
        }
    }

    pub fn phases(phases: Vec<AnalysisPhase>, reason: impl Into<String>) -> Self {
        AnalysisOptions {
            phases,
            reason: reason.into(),
        }
    }
}

/// Runs the source pipeline against a workspace. A second trigger while
/// a run is active waits on the run lock rather than overlapping.
pub struct AnalysisRunner {
    workspace: Workspace,
    holder: Arc<ModuleHolder>,
    broker: Arc<Broker>,
    sources: Vec<Box<dyn Source>>,
    run_lock: Mutex<()>,
}

impl AnalysisRunner {
    pub fn new(workspace: Workspace, holder: Arc<ModuleHolder>, broker: Arc<Broker>) -> Self {
        AnalysisRunner {
            workspace,
            holder,
            broker,
            sources: vec![
                Box::new(BazelQuerySource),
                Box::new(CompileDepsSource),
                Box::new(SymbolSource),
                Box::new(FileDiscoverySource),
                Box::new(BinarySource),
            ],
            run_lock: Mutex::new(()),
        }
    }

    /// Swap the source set; tests stub the adapters through this.
    pub fn with_sources(mut self, sources: Vec<Box<dyn Source>>) -> Self {
        self.sources = sources;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Execute one analysis run. Optional-phase failures degrade to
    /// warnings; a failed bazel query aborts with an `error` status.
    /// Cancellation is always silent.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        options: AnalysisOptions,
    ) -> anyhow::Result<()> {
        let _guard = self.run_lock.lock().await;
        tracing::info!(reason = %options.reason, "starting analysis run");

        let selected: Vec<&dyn Source> = self
            .sources
            .iter()
            .filter(|s| options.phases.contains(&s.phase()))
            .map(|s| s.as_ref())
            .collect();
        let total = selected.len() as u32 + 1;

        for (index, source) in selected.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let phase = source.phase();
            let step = index as u32 + 1;
            self.publish_status(WorkspaceStatus::new(
                WorkspaceState::for_phase(phase),
                format!("{phase:?}"),
                step,
                total,
            ));

            let module = self.holder.snapshot().await;
            match source.run(cancel, &self.workspace, &module).await {
                Ok(partial) => {
                    let merged = merge(&module, &[partial]);
                    let update = TargetGraphUpdate {
                        complete: false,
                        target_count: merged.targets.len(),
                        edge_count: merged.dependencies.len(),
                        issue_count: merged.issues.len(),
                    };
                    self.holder.replace(merged).await;
                    self.publish_graph(update);
                    if phase == AnalysisPhase::BazelQuery {
                        self.publish_status(WorkspaceStatus::new(
                            WorkspaceState::TargetsReady,
                            "targets loaded",
                            step,
                            total,
                        ));
                    }
                }
                Err(err) if err.is_cancelled() => return Ok(()),
                Err(err) if phase.is_mandatory() => {
                    tracing::error!("mandatory phase {phase:?} failed: {err}");
                    self.publish_status(WorkspaceStatus::new(
                        WorkspaceState::Error,
                        err.to_string(),
                        step,
                        total,
                    ));
                    return Err(err.into());
                }
                Err(err) => {
                    tracing::warn!("phase {phase:?} failed: {err}");
                    self.publish_status(WorkspaceStatus::new(
                        WorkspaceState::for_phase(phase),
                        format!("{phase:?} skipped: {err}"),
                        step,
                        total,
                    ));
                }
            }
        }

        let module = self.holder.snapshot().await;
        self.publish_graph(TargetGraphUpdate {
            complete: true,
            target_count: module.targets.len(),
            edge_count: module.dependencies.len(),
            issue_count: module.issues.len(),
        });
        self.publish_status(WorkspaceStatus::new(
            WorkspaceState::Ready,
            "analysis complete",
            total,
            total,
        ));
        tracing::info!(
            targets = module.targets.len(),
            edges = module.dependencies.len(),
            "analysis run finished"
        );
        Ok(())
    }

    fn publish_status(&self, status: WorkspaceStatus) {
        match serde_json::to_value(&status) {
            Ok(data) => {
                self.broker.publish(TOPIC_WORKSPACE_STATUS, "status", data);
            }
            Err(err) => tracing::error!("status payload serialisation failed: {err}"),
        }
    }

    fn publish_graph(&self, update: TargetGraphUpdate) {
        match serde_json::to_value(&update) {
            Ok(data) => {
                self.broker.publish(TOPIC_TARGET_GRAPH, "graph", data);
            }
            Err(err) => tracing::error!("graph payload serialisation failed: {err}"),
        }
    }
}
