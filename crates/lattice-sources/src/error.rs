//! Adapter error types

use thiserror::Error;

/// Why a source adapter failed. Optional phases surface these as status
/// warnings; only the bazel query aborts a full analysis.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("parse failure: {0}")]
    Parse(String),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl SourceError {
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SourceError::Cancelled)
    }
}
