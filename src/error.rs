//! Error types for the digital twin orchestrator

use crate::models::{RunPhase, TwinState};
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    /// Context Store could not be reached or created. Callers recover
    /// locally and continue in degraded mode.
    #[error("Context store unavailable: {0}")]
    StoreUnavailable(String),

    /// Language-generation capability failed or timed out.
    #[error("Generation error: {0}")]
    GenerationError(String),

    /// Malformed run input. The only error allowed to abort a run.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Post-completion persistence failure. Logged, never surfaced.
    #[error("Archival error: {0}")]
    ArchivalError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: RunPhase, to: RunPhase },

    #[error("Run {run_id} cancelled before finalization")]
    Cancelled {
        run_id: Uuid,
        partial: Box<TwinState>,
    },

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// True for failures that a caller may recover from by degrading.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            OrchestrationError::ValidationError(_)
                | OrchestrationError::ConfigError(_)
                | OrchestrationError::InvalidTransition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_not_recoverable() {
        let err = OrchestrationError::ValidationError("neither question nor payload".into());
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("neither question nor payload"));
    }

    #[test]
    fn test_store_unavailable_is_recoverable() {
        let err = OrchestrationError::StoreUnavailable("no directory configured".into());
        assert!(err.is_recoverable());
    }
}
