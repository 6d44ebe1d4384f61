//! Isolated stores, runner and clock for one test.

use super::constants::TEMPLATE_BODY;
use super::fixtures::FakeGenerator;
use chrono::{DateTime, TimeZone, Utc};
use content_autopilot::automation::{
    all_pipelines, create_scheduler, AutomationScheduler, Clock, GenerationSettings, ManualClock,
    Orchestrator, PipelineContext, PipelineRunner, RunGuards, SchedulerHandle,
};
use content_autopilot::automation_store::{
    AutomationStore, PipelineId, PipelineSettings, SqliteAutomationStore,
};
use content_autopilot::content_store::{
    ContentStore, ContentTemplate, NewContentTemplate, SqliteContentStore,
};
use content_autopilot::llm::TextGenerator;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

/// Test environment with its own databases in a temporary directory.
///
/// Resources are removed when the value is dropped.
pub struct TestEnv {
    pub automation_store: Arc<dyn AutomationStore>,
    pub content_store: Arc<dyn ContentStore>,
    pub generator: Arc<FakeGenerator>,
    pub clock: Arc<ManualClock>,
    pub runner: Arc<PipelineRunner>,
    _temp_dir: TempDir,
}

impl TestEnv {
    pub fn new(generator: FakeGenerator) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let automation_store: Arc<dyn AutomationStore> = Arc::new(
            SqliteAutomationStore::new(temp_dir.path().join("automation.db")).unwrap(),
        );
        let content_store: Arc<dyn ContentStore> =
            Arc::new(SqliteContentStore::new(temp_dir.path().join("content.db")).unwrap());
        let generator = Arc::new(generator);
        let clock = Arc::new(ManualClock::new(start_time()));

        let ctx = Arc::new(PipelineContext::new(
            Arc::clone(&content_store),
            Arc::clone(&generator) as Arc<dyn TextGenerator>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            GenerationSettings::default(),
            Duration::from_secs(5),
        ));
        let runner = Arc::new(PipelineRunner::new(
            Arc::clone(&automation_store),
            ctx,
            RunGuards::new(),
        ));

        Self {
            automation_store,
            content_store,
            generator,
            clock,
            runner,
            _temp_dir: temp_dir,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Seeds `settings`, which must not exist yet.
    pub fn seed(&self, settings: PipelineSettings) {
        assert!(self.automation_store.seed_settings(&settings).unwrap());
    }

    pub fn enable(&self, pipeline_id: PipelineId) {
        self.seed(PipelineSettings {
            enabled: true,
            ..PipelineSettings::defaults(pipeline_id)
        });
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            all_pipelines(),
            Arc::clone(&self.automation_store),
            Arc::clone(&self.runner),
        )
    }

    pub fn scheduler(&self) -> (AutomationScheduler, SchedulerHandle) {
        create_scheduler(
            all_pipelines(),
            Arc::clone(&self.automation_store),
            Arc::clone(&self.runner),
            Duration::from_secs(3600),
            CancellationToken::new(),
        )
    }

    pub fn add_template(&self, name: &str, frequency_days: u32) -> ContentTemplate {
        self.content_store
            .insert_template(&NewContentTemplate {
                name: name.to_string(),
                content_type: "blog_post".to_string(),
                body: TEMPLATE_BODY.to_string(),
                keywords: vec!["ai".to_string(), "writing".to_string()],
                frequency_days,
                active: true,
            })
            .unwrap()
    }
}
