use super::context::PipelineContext;
use super::error::PipelineError;
use super::runner::AggregateResult;
use crate::automation_store::{PipelineId, PipelineSettings};
use async_trait::async_trait;

/// One of the fixed automation pipelines.
///
/// A pipeline selects its eligible work items, runs each through its action
/// and reports the tally. It never touches scheduling timestamps.
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn id(&self) -> PipelineId;

    /// Human-readable name for this pipeline.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Executes one batch using the batch parameters in `settings`.
    async fn run(
        &self,
        ctx: &PipelineContext,
        settings: &PipelineSettings,
    ) -> Result<AggregateResult, PipelineError>;
}
