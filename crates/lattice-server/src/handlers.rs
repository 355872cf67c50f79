//! REST handlers: lens rendering, raw graph, health

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use lattice_core::{render, request_hash, respond, LensResponse, RenderRequest};

use crate::ServerState;

/// Body of the lens endpoint: a render request plus the hash of the
/// graph the client currently holds.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LensRequestBody {
    #[serde(flatten)]
    pub request: RenderRequest,
    pub previous_hash: Option<String>,
}

/// Evaluate a lens request against the current module. Returns a diff
/// when the client's previous graph is known and close enough, else the
/// full graph; either way the new hash.
pub async fn render_lens(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<LensRequestBody>,
) -> Result<Json<LensResponse>, (StatusCode, String)> {
    let hash = request_hash(&body.request);
    let (module, generation) = state.holder.snapshot_with_generation().await;

    // The previous graph must be looked up before the fresh render lands
    // in the cache: when the client re-sends the same request after a
    // module update, its hash is the same and the insert below would
    // otherwise shadow the graph the client actually holds.
    let previous = body
        .previous_hash
        .as_deref()
        .and_then(|previous| state.cache.get(previous));

    let current = match state.cache.get_current(&hash, generation) {
        Some(current) => current,
        None => {
            let flat = module.flat_graph();
            let rendered = render(&flat, &body.request)
                .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;
            let rendered = Arc::new(rendered);
            state.cache.insert(hash.clone(), generation, rendered.clone());
            rendered
        }
    };

    let response = respond(
        previous.as_ref().map(|entry| entry.graph.as_ref()),
        &current,
        hash,
    );
    Ok(Json(response))
}

/// The raw, unlensed module: targets, typed edges, issues.
pub async fn get_graph(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let module = state.holder.snapshot().await;
    Json(serde_json::json!({
        "name": &module.name,
        "targets": &module.targets,
        "dependencies": &module.dependencies,
        "fileDependencies": &module.file_dependencies,
        "issues": &module.issues,
        "uncoveredFiles": &module.uncovered_files,
        "systemLibraries": &module.system_libraries,
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
