use super::pipeline::Pipeline;
use super::runner::RunGuards;
use crate::automation_store::{
    AutomationStore, PipelineId, PipelineSettings, RunRecord, SettingsPatch,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

/// Where a pipeline's scheduler loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Checking,
    Waiting { until: DateTime<Utc> },
    Running,
}

/// State shared between the scheduler loops and [`SchedulerHandle`].
pub struct SharedSchedulerState {
    pub states: HashMap<PipelineId, SchedulerState>,
}

impl SharedSchedulerState {
    pub fn new() -> Self {
        Self {
            states: PipelineId::ALL
                .iter()
                .map(|id| (*id, SchedulerState::Idle))
                .collect(),
        }
    }
}

impl Default for SharedSchedulerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one pipeline for status output.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub pipeline_id: PipelineId,
    pub name: &'static str,
    pub description: &'static str,
    pub settings: PipelineSettings,
    pub state: SchedulerState,
    pub is_running: bool,
    pub last_run: Option<RunRecord>,
}

/// Handle for inspecting the schedulers and nudging them after settings change.
#[derive(Clone)]
pub struct SchedulerHandle {
    pipelines: Vec<Arc<dyn Pipeline>>,
    shared_state: Arc<RwLock<SharedSchedulerState>>,
    wakers: Arc<HashMap<PipelineId, Arc<Notify>>>,
    automation_store: Arc<dyn AutomationStore>,
    guards: RunGuards,
}

impl SchedulerHandle {
    pub fn new(
        pipelines: Vec<Arc<dyn Pipeline>>,
        shared_state: Arc<RwLock<SharedSchedulerState>>,
        wakers: Arc<HashMap<PipelineId, Arc<Notify>>>,
        automation_store: Arc<dyn AutomationStore>,
        guards: RunGuards,
    ) -> Self {
        Self {
            pipelines,
            shared_state,
            wakers,
            automation_store,
            guards,
        }
    }

    /// Settings, live scheduler state and last run for every pipeline.
    pub async fn statuses(&self) -> Result<Vec<PipelineStatus>> {
        let states = self.shared_state.read().await.states.clone();

        let mut statuses = Vec::with_capacity(self.pipelines.len());
        for pipeline in &self.pipelines {
            let pipeline_id = pipeline.id();
            statuses.push(PipelineStatus {
                pipeline_id,
                name: pipeline.name(),
                description: pipeline.description(),
                settings: self.automation_store.get_settings(pipeline_id)?,
                state: states
                    .get(&pipeline_id)
                    .copied()
                    .unwrap_or(SchedulerState::Idle),
                is_running: self.guards.is_running(pipeline_id),
                last_run: self.automation_store.get_last_run(pipeline_id)?,
            });
        }
        Ok(statuses)
    }

    pub async fn state(&self, pipeline_id: PipelineId) -> SchedulerState {
        self.shared_state
            .read()
            .await
            .states
            .get(&pipeline_id)
            .copied()
            .unwrap_or(SchedulerState::Idle)
    }

    /// Makes the pipeline's loop tick again now. The tick re-reads settings,
    /// so an in-flight run is unaffected.
    pub fn notify_settings_changed(&self, pipeline_id: PipelineId) {
        if let Some(waker) = self.wakers.get(&pipeline_id) {
            debug!(pipeline = %pipeline_id, "Waking scheduler after settings change");
            waker.notify_one();
        }
    }

    /// Applies an operator settings change and wakes the pipeline's loop.
    pub fn update_settings(
        &self,
        pipeline_id: PipelineId,
        patch: &SettingsPatch,
    ) -> Result<PipelineSettings> {
        let settings = self.automation_store.update_settings(pipeline_id, patch)?;
        self.notify_settings_changed(pipeline_id);
        Ok(settings)
    }
}
