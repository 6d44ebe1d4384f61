//! Stub pipelines and a runner wired to temporary databases.

use super::clock::ManualClock;
use super::context::PipelineContext;
use super::error::PipelineError;
use super::pipeline::Pipeline;
use super::pipelines::test_support::{fixture, Fixture};
use super::runner::{AggregateResult, PipelineRunner, RunGuards};
use crate::automation_store::{
    AutomationStore, PipelineId, PipelineSettings, SqliteAutomationStore,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Pipeline that adds one item per run, or fails as a whole.
pub struct StubPipeline {
    id: PipelineId,
    fail: bool,
    runs: AtomicUsize,
}

impl StubPipeline {
    pub fn new(id: PipelineId) -> Self {
        Self {
            id,
            fail: false,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn failing(id: PipelineId) -> Self {
        Self {
            fail: true,
            ..Self::new(id)
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pipeline for StubPipeline {
    fn id(&self) -> PipelineId {
        self.id
    }

    fn name(&self) -> &'static str {
        "Stub"
    }

    fn description(&self) -> &'static str {
        "Counts its runs"
    }

    async fn run(
        &self,
        _ctx: &PipelineContext,
        _settings: &PipelineSettings,
    ) -> Result<AggregateResult, PipelineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::Generation("stub failure".to_string()));
        }
        Ok(AggregateResult {
            added: 1,
            ..Default::default()
        })
    }
}

pub struct Harness {
    pub automation_store: Arc<dyn AutomationStore>,
    pub runner: Arc<PipelineRunner>,
    pub clock: Arc<ManualClock>,
    pub fixture: Fixture,
    _temp_dir: TempDir,
}

pub fn harness() -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let automation_store: Arc<dyn AutomationStore> =
        Arc::new(SqliteAutomationStore::new(temp_dir.path().join("automation.db")).unwrap());
    let fixture = fixture(vec![]);
    let runner = Arc::new(PipelineRunner::new(
        Arc::clone(&automation_store),
        Arc::new(fixture.ctx.clone()),
        RunGuards::new(),
    ));
    Harness {
        automation_store,
        runner,
        clock: Arc::clone(&fixture.clock),
        fixture,
        _temp_dir: temp_dir,
    }
}
