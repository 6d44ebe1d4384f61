use super::pipeline::Pipeline;
use super::runner::{AggregateResult, PipelineRunner};
use crate::automation_store::{AutomationStore, PipelineId, RunTrigger};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

/// Combined report of a manual run.
#[derive(Debug, Clone, Serialize)]
pub struct RunAllReport {
    /// False when any pipeline failed as a whole.
    pub success: bool,
    /// Enabled pipelines only.
    pub per_pipeline: BTreeMap<PipelineId, AggregateResult>,
}

/// Manual "run everything now" entry point.
///
/// Pipelines run one after another, never in parallel. Schedule timestamps
/// are left alone; the run only adds ledger rows.
pub struct Orchestrator {
    pipelines: Vec<Arc<dyn Pipeline>>,
    automation_store: Arc<dyn AutomationStore>,
    runner: Arc<PipelineRunner>,
}

impl Orchestrator {
    pub fn new(
        mut pipelines: Vec<Arc<dyn Pipeline>>,
        automation_store: Arc<dyn AutomationStore>,
        runner: Arc<PipelineRunner>,
    ) -> Self {
        pipelines.sort_by_key(|p| p.id());
        Self {
            pipelines,
            automation_store,
            runner,
        }
    }

    pub async fn run_all(&self) -> RunAllReport {
        let mut report = RunAllReport {
            success: true,
            per_pipeline: BTreeMap::new(),
        };

        for pipeline in &self.pipelines {
            let pipeline_id = pipeline.id();
            let settings = match self.automation_store.get_settings(pipeline_id) {
                Ok(settings) => settings,
                Err(e) => {
                    error!(pipeline = %pipeline_id, error = %e, "Failed to load settings for manual run");
                    report.success = false;
                    report
                        .per_pipeline
                        .insert(pipeline_id, AggregateResult::failed());
                    continue;
                }
            };
            if !settings.enabled {
                info!(pipeline = %pipeline_id, "Skipping disabled pipeline");
                continue;
            }

            let execution = self
                .runner
                .execute(Arc::clone(pipeline), &settings, RunTrigger::Manual)
                .await;
            if execution.outcome.is_err() {
                report.success = false;
            }
            report.per_pipeline.insert(pipeline_id, execution.aggregate());
        }

        info!(
            success = report.success,
            pipelines = report.per_pipeline.len(),
            "Manual run finished"
        );
        report
    }
}
