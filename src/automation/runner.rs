//! Generic batch harness and guarded pipeline execution.

use super::context::PipelineContext;
use super::error::{ItemError, PipelineError};
use super::pipeline::Pipeline;
use crate::automation_store::{
    AutomationStore, NewRunRecord, PipelineId, PipelineSettings, RunRecord, RunStatus, RunTrigger,
};
use crate::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Item error messages kept for a run's `error_detail`.
const MAX_ERROR_SAMPLES: usize = 5;

/// Tally of one batch. `added + skipped + errors` equals the number of items attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    pub added: u32,
    pub skipped: u32,
    pub errors: u32,
    /// The run fell back to built-in data instead of generated data.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
    #[serde(skip)]
    pub error_samples: Vec<String>,
}

impl AggregateResult {
    /// Report entry for a pipeline that failed as a whole.
    pub fn failed() -> Self {
        Self {
            errors: 1,
            ..Default::default()
        }
    }

    pub fn attempted(&self) -> u32 {
        self.added + self.skipped + self.errors
    }

    pub fn counts(&self) -> (u32, u32, u32) {
        (self.added, self.skipped, self.errors)
    }

    pub fn status(&self) -> RunStatus {
        let attempted = self.attempted();
        if attempted > 0 && self.errors == attempted {
            RunStatus::Error
        } else if self.errors > 0 || self.degraded {
            RunStatus::Partial
        } else {
            RunStatus::Success
        }
    }

    fn error_detail(&self) -> Option<String> {
        if self.errors == 0 {
            return self.degraded.then(|| "used built-in fallback data".to_string());
        }
        let mut detail = format!("{} item(s) failed", self.errors);
        if !self.error_samples.is_empty() {
            detail.push_str(": ");
            detail.push_str(&self.error_samples.join("; "));
        }
        Some(detail)
    }
}

/// What a successful item action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Added,
    /// The output already existed; no generation call was needed.
    Skipped,
}

/// Drains `items` through `action`, at most `limit` of them, in order.
///
/// Each item's failure is tallied and the loop moves on. The only error that
/// stops the batch is a configuration error, since every remaining item would
/// fail the same way.
pub async fn execute_batch<I, F, Fut>(
    pipeline_id: PipelineId,
    items: I,
    limit: usize,
    mut action: F,
) -> Result<AggregateResult, PipelineError>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<ItemOutcome, ItemError>>,
{
    let mut result = AggregateResult::default();

    for item in items.into_iter().take(limit) {
        match action(item).await {
            Ok(ItemOutcome::Added) => {
                result.added += 1;
                metrics::record_pipeline_item(pipeline_id.as_str(), "added");
            }
            Ok(ItemOutcome::Skipped) => {
                result.skipped += 1;
                metrics::record_pipeline_item(pipeline_id.as_str(), "skipped");
            }
            Err(e) if e.is_configuration() => {
                warn!(pipeline = %pipeline_id, error = %e, "Aborting batch on configuration error");
                return Err(e.into());
            }
            Err(e) => {
                warn!(pipeline = %pipeline_id, error = %e, "Work item failed");
                result.errors += 1;
                if result.error_samples.len() < MAX_ERROR_SAMPLES {
                    result.error_samples.push(e.to_string());
                }
                metrics::record_pipeline_item(pipeline_id.as_str(), "error");
            }
        }
    }

    Ok(result)
}

/// Per-pipeline mutual exclusion shared by the scheduler and the orchestrator.
#[derive(Clone)]
pub struct RunGuards {
    guards: Arc<HashMap<PipelineId, Arc<Mutex<()>>>>,
}

impl RunGuards {
    pub fn new() -> Self {
        let guards = PipelineId::ALL
            .iter()
            .map(|id| (*id, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            guards: Arc::new(guards),
        }
    }

    fn for_pipeline(&self, pipeline_id: PipelineId) -> Arc<Mutex<()>> {
        Arc::clone(&self.guards[&pipeline_id])
    }

    pub fn is_running(&self, pipeline_id: PipelineId) -> bool {
        self.guards[&pipeline_id].try_lock().is_err()
    }
}

impl Default for RunGuards {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one guarded pipeline execution.
#[derive(Debug)]
pub struct PipelineExecution {
    pub pipeline_id: PipelineId,
    pub outcome: Result<AggregateResult, PipelineError>,
    /// The ledger row, if it could be written.
    pub record: Option<RunRecord>,
}

impl PipelineExecution {
    pub fn status(&self) -> RunStatus {
        match &self.outcome {
            Ok(result) => result.status(),
            Err(_) => RunStatus::Error,
        }
    }

    /// Collapses a pipeline-level failure to `{0, 0, 1}`.
    pub fn aggregate(&self) -> AggregateResult {
        match &self.outcome {
            Ok(result) => result.clone(),
            Err(_) => AggregateResult::failed(),
        }
    }
}

/// Runs pipelines in isolation and records every attempt in the run ledger.
pub struct PipelineRunner {
    automation_store: Arc<dyn AutomationStore>,
    ctx: Arc<PipelineContext>,
    guards: RunGuards,
}

impl PipelineRunner {
    pub fn new(
        automation_store: Arc<dyn AutomationStore>,
        ctx: Arc<PipelineContext>,
        guards: RunGuards,
    ) -> Self {
        Self {
            automation_store,
            ctx,
            guards,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn guards(&self) -> &RunGuards {
        &self.guards
    }

    /// Executes `pipeline` once and appends exactly one [`RunRecord`].
    ///
    /// Waits for any in-flight run of the same pipeline first. The pipeline
    /// body runs in its own task so a panic becomes a failed run rather than
    /// unwinding into the caller.
    pub async fn execute(
        &self,
        pipeline: Arc<dyn Pipeline>,
        settings: &PipelineSettings,
        trigger: RunTrigger,
    ) -> PipelineExecution {
        let pipeline_id = pipeline.id();
        let guard = self.guards.for_pipeline(pipeline_id);
        let _running = guard.lock().await;

        let started_at = self.ctx.clock.now();
        let start_time = Instant::now();
        info!(
            pipeline = %pipeline_id,
            trigger = trigger.as_str(),
            "Starting pipeline run"
        );
        metrics::set_pipeline_running(pipeline_id.as_str(), true);

        let ctx = Arc::clone(&self.ctx);
        let task_settings = settings.clone();
        let handle = tokio::spawn(async move { pipeline.run(&ctx, &task_settings).await });
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(PipelineError::Panicked(e.to_string())),
        };
        let elapsed = start_time.elapsed();

        let (aggregate, status, error_detail) = match &outcome {
            Ok(result) => (result.clone(), result.status(), result.error_detail()),
            Err(e) => (AggregateResult::failed(), RunStatus::Error, Some(e.to_string())),
        };

        match &outcome {
            Ok(result) => info!(
                pipeline = %pipeline_id,
                status = status.as_str(),
                added = result.added,
                skipped = result.skipped,
                errors = result.errors,
                elapsed_ms = elapsed.as_millis() as u64,
                "Pipeline run finished"
            ),
            Err(e) => error!(
                pipeline = %pipeline_id,
                error = %e,
                elapsed_ms = elapsed.as_millis() as u64,
                "Pipeline run failed"
            ),
        }

        metrics::record_pipeline_run(
            pipeline_id.as_str(),
            status.as_str(),
            trigger.as_str(),
            elapsed,
        );
        metrics::set_pipeline_running(pipeline_id.as_str(), false);

        let new_record = NewRunRecord {
            pipeline_id,
            started_at,
            duration_ms: elapsed.as_millis() as i64,
            status,
            triggered_by: trigger,
            added: aggregate.added,
            skipped: aggregate.skipped,
            errors: aggregate.errors,
            error_detail,
        };
        let record = match self.automation_store.append_run(&new_record) {
            Ok(record) => Some(record),
            Err(e) => {
                error!(pipeline = %pipeline_id, error = %e, "Failed to append run record");
                None
            }
        };

        PipelineExecution {
            pipeline_id,
            outcome,
            record,
        }
    }
}
