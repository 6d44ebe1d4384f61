use crate::content_store::StoreError;
use crate::llm::GenerationError;
use std::time::Duration;
use thiserror::Error;

/// Failure on a single work item. Counted in `errors`; the batch continues.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unparseable response: {0}")]
    Unparseable(String),

    #[error("Invalid response: {0}")]
    Invalid(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ItemError {
    /// A missing credential fails every item the same way, so it aborts the
    /// run instead of being tallied per item.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ItemError::Generation(e) if e.is_configuration())
    }
}

/// Failure before or between items. Ends the run with status `error`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Settings unavailable: {0}")]
    Settings(String),

    #[error("Pipeline task panicked: {0}")]
    Panicked(String),
}

impl From<ItemError> for PipelineError {
    /// Escalates an error hit outside the per-item loop.
    fn from(err: ItemError) -> Self {
        match err {
            ItemError::Generation(e) if e.is_configuration() => {
                PipelineError::Configuration(e.to_string())
            }
            ItemError::Store(e) => PipelineError::Store(e),
            other => PipelineError::Generation(other.to_string()),
        }
    }
}
