//! Pipeline automation: the batch harness, the four pipelines, one scheduler
//! loop per pipeline and the manual orchestrator.

pub mod clock;
mod context;
mod error;
mod handle;
mod orchestrator;
mod pipeline;
pub mod pipelines;
mod runner;
mod scheduler;
#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{GenerationSettings, PipelineContext};
pub use error::{ItemError, PipelineError};
pub use handle::{PipelineStatus, SchedulerHandle, SchedulerState};
pub use orchestrator::{Orchestrator, RunAllReport};
pub use pipeline::Pipeline;
pub use pipelines::all_pipelines;
pub use runner::{
    execute_batch, AggregateResult, ItemOutcome, PipelineExecution, PipelineRunner, RunGuards,
};
pub use scheduler::{create_scheduler, AutomationScheduler, PipelineScheduler, TickOutcome};
