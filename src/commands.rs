//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lattice_analysis::{
    AnalysisOptions, AnalysisRunner, Broker, ModuleHolder, TopicConfig, WorkspaceState,
    WorkspaceStatus, TOPIC_TARGET_GRAPH, TOPIC_WORKSPACE_STATUS,
};
use lattice_core::Module;
use lattice_server::{ServerConfig, ServerState};
use lattice_sources::{AnalysisPhase, Workspace};
use lattice_watcher::{run_debouncer, ChangeGroup, DebounceConfig, WorkspaceWatcher};

pub async fn serve(root: PathBuf, host: String, port: u16) -> anyhow::Result<()> {
    let workspace = Workspace::new(&root);
    let cancel = CancellationToken::new();

    let broker = Arc::new(Broker::new());
    broker.register_topic(TOPIC_WORKSPACE_STATUS, TopicConfig::latest_only());
    broker.register_topic(TOPIC_TARGET_GRAPH, TopicConfig::latest_only());
    publish_status(
        &broker,
        WorkspaceStatus::new(WorkspaceState::Initializing, "starting up", 0, 0),
    );

    let holder = Arc::new(ModuleHolder::new(Module::new(workspace.basename(), &root)));
    let runner = Arc::new(AnalysisRunner::new(
        workspace.clone(),
        holder.clone(),
        broker.clone(),
    ));

    // Ctrl-C tears the whole pipeline down through the token.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
                cancel.cancel();
            }
        });
    }

    // Initial full analysis in the background; the server is already up.
    {
        let runner = runner.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = runner
                .run(&cancel, AnalysisOptions::full("initial analysis"))
                .await
            {
                tracing::error!("initial analysis failed: {err}");
            }
        });
    }

    // Watcher → debouncer → runner, a single-writer pipeline.
    let (change_tx, change_rx) = mpsc::unbounded_channel();
    match WorkspaceWatcher::new(&workspace) {
        Ok(mut watcher) => {
            publish_status(
                &broker,
                WorkspaceStatus::new(WorkspaceState::Watching, "watching for changes", 0, 0),
            );
            let cancel = cancel.clone();
            tokio::spawn(async move {
                while let Some(change) = watcher.next(&cancel).await {
                    if change_tx.send(change).is_err() {
                        break;
                    }
                }
            });
        }
        Err(err) => {
            tracing::warn!("file watching unavailable: {err}");
        }
    }

    let (flush_tx, mut flush_rx) = mpsc::channel(16);
    tokio::spawn(run_debouncer(
        change_rx,
        DebounceConfig::default(),
        cancel.clone(),
        flush_tx,
    ));
    {
        let runner = runner.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(groups) = flush_rx.recv().await {
                let options = reanalysis_options(&groups);
                if let Err(err) = runner.run(&cancel, options).await {
                    tracing::error!("re-analysis failed: {err}");
                }
            }
        });
    }

    let state = Arc::new(ServerState::new(holder, broker.clone(), cancel.clone()));
    let result = lattice_server::serve(state, ServerConfig { host, port }).await;

    cancel.cancel();
    broker.close();
    result
}

pub async fn analyze(root: PathBuf) -> anyhow::Result<()> {
    let workspace = Workspace::new(&root);
    let broker = Arc::new(Broker::new());
    let holder = Arc::new(ModuleHolder::new(Module::new(workspace.basename(), &root)));
    let runner = AnalysisRunner::new(workspace, holder.clone(), broker);

    let cancel = CancellationToken::new();
    runner
        .run(&cancel, AnalysisOptions::full("one-shot analysis"))
        .await?;

    let module = holder.snapshot().await;
    println!("module:    {}", module.name);
    println!("targets:   {}", module.targets.len());
    println!("edges:     {}", module.dependencies.len());
    println!("uncovered: {}", module.uncovered_files.len());
    println!("issues:    {}", module.issues.len());
    for issue in &module.issues {
        println!("  [{:?}] {}", issue.severity, issue.description);
    }
    Ok(())
}

/// Union of the phases the flushed change groups require, in pipeline
/// order.
fn reanalysis_options(groups: &[ChangeGroup]) -> AnalysisOptions {
    let phases: Vec<AnalysisPhase> = AnalysisPhase::ALL
        .into_iter()
        .filter(|phase| {
            groups
                .iter()
                .any(|group| group.change_type.phases().contains(phase))
        })
        .collect();
    let reason = groups
        .iter()
        .map(|group| format!("{:?}×{}", group.change_type, group.paths.len()))
        .collect::<Vec<_>>()
        .join(", ");
    AnalysisOptions::phases(phases, reason)
}

fn publish_status(broker: &Broker, status: WorkspaceStatus) {
    if let Ok(data) = serde_json::to_value(&status) {
        broker.publish(TOPIC_WORKSPACE_STATUS, "status", data);
    }
}
