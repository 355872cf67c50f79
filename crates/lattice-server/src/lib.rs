//! HTTP + SSE boundary

pub mod handlers;
pub mod router;
pub mod sse;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use lattice_analysis::{Broker, ModuleHolder};
use lattice_core::RenderCache;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Shared state behind every handler.
pub struct ServerState {
    pub holder: Arc<ModuleHolder>,
    pub broker: Arc<Broker>,
    pub cache: RenderCache,
    pub cancel: CancellationToken,
}

impl ServerState {
    pub fn new(holder: Arc<ModuleHolder>, broker: Arc<Broker>, cancel: CancellationToken) -> Self {
        ServerState {
            holder,
            broker,
            cache: RenderCache::default(),
            cancel,
        }
    }
}

/// Bind and serve until the cancellation token fires.
pub async fn serve(state: Arc<ServerState>, config: ServerConfig) -> anyhow::Result<()> {
    let router = router::create_router(state.clone());
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{addr}");

    let cancel = state.cancel.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}
