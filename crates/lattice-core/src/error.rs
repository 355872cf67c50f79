//! Core error types

use thiserror::Error;

/// Why a render request was rejected. Always a client error; the renderer
/// never panics on unknown node kinds, it hides them instead.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid lens: {0}")]
    InvalidLens(String),
}
