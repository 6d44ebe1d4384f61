use super::clock::Clock;
use super::handle::{SchedulerHandle, SchedulerState, SharedSchedulerState};
use super::pipeline::Pipeline;
use super::runner::PipelineRunner;
use crate::automation_store::{AutomationStore, PipelineId, RunStatus, RunTrigger};
use crate::metrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long to wait before re-checking after the settings store failed.
const STORE_RETRY: Duration = Duration::from_secs(60);

/// How long shutdown waits for each pipeline loop to finish its current run.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// What a single tick decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Disabled,
    Waiting {
        next_run_at: DateTime<Utc>,
    },
    Ran {
        status: RunStatus,
        next_run_at: DateTime<Utc>,
    },
    StoreUnavailable,
}

/// Scheduler loop for one pipeline.
///
/// Every tick reloads the pipeline's settings, so changes made while the loop
/// waits are seen on the next tick and never in the middle of a run.
pub struct PipelineScheduler {
    pipeline: Arc<dyn Pipeline>,
    automation_store: Arc<dyn AutomationStore>,
    runner: Arc<PipelineRunner>,
    clock: Arc<dyn Clock>,
    disabled_recheck: Duration,
    shared_state: Arc<RwLock<SharedSchedulerState>>,
    wake: Arc<Notify>,
}

impl PipelineScheduler {
    pub fn new(
        pipeline: Arc<dyn Pipeline>,
        automation_store: Arc<dyn AutomationStore>,
        runner: Arc<PipelineRunner>,
        disabled_recheck: Duration,
        shared_state: Arc<RwLock<SharedSchedulerState>>,
        wake: Arc<Notify>,
    ) -> Self {
        let clock = Arc::clone(&runner.context().clock);
        Self {
            pipeline,
            automation_store,
            runner,
            clock,
            disabled_recheck,
            shared_state,
            wake,
        }
    }

    pub fn pipeline_id(&self) -> PipelineId {
        self.pipeline.id()
    }

    async fn set_state(&self, state: SchedulerState) {
        let mut shared = self.shared_state.write().await;
        shared.states.insert(self.pipeline_id(), state);
    }

    /// Runs one check of the state machine, executing the pipeline if it is due.
    pub async fn tick(&self) -> TickOutcome {
        let pipeline_id = self.pipeline_id();
        self.set_state(SchedulerState::Checking).await;

        let now = self.clock.now();
        let settings = match self.automation_store.get_settings(pipeline_id) {
            Ok(settings) => settings,
            Err(e) => {
                error!(pipeline = %pipeline_id, error = %e, "Failed to load pipeline settings");
                self.set_state(SchedulerState::Idle).await;
                return TickOutcome::StoreUnavailable;
            }
        };

        if !settings.enabled {
            debug!(pipeline = %pipeline_id, "Pipeline disabled");
            self.set_state(SchedulerState::Idle).await;
            return TickOutcome::Disabled;
        }

        let next_run_at = match settings.next_run_at {
            Some(next) => next,
            None => {
                // A missed window computed from an old last run is due right away.
                let next = settings
                    .cadence
                    .next_after(settings.last_run_at.unwrap_or(now));
                if let Err(e) = self.automation_store.set_next_run_at(pipeline_id, next) {
                    warn!(pipeline = %pipeline_id, error = %e, "Failed to persist next run time");
                }
                info!(pipeline = %pipeline_id, next_run_at = %next, "Computed next run time");
                next
            }
        };

        if now < next_run_at {
            self.set_state(SchedulerState::Waiting { until: next_run_at })
                .await;
            return TickOutcome::Waiting { next_run_at };
        }

        self.set_state(SchedulerState::Running).await;
        let execution = self
            .runner
            .execute(Arc::clone(&self.pipeline), &settings, RunTrigger::Schedule)
            .await;

        let next_run_at = settings.cadence.next_after(now);
        if let Err(e) = self
            .automation_store
            .record_schedule(pipeline_id, now, next_run_at)
        {
            error!(pipeline = %pipeline_id, error = %e, "Failed to record schedule after run");
        }
        self.set_state(SchedulerState::Idle).await;

        TickOutcome::Ran {
            status: execution.status(),
            next_run_at,
        }
    }

    /// How long to sleep after `outcome` before the next tick.
    pub fn wait_after(&self, outcome: &TickOutcome) -> Duration {
        match outcome {
            TickOutcome::Disabled => self.disabled_recheck,
            TickOutcome::StoreUnavailable => STORE_RETRY,
            TickOutcome::Waiting { next_run_at } | TickOutcome::Ran { next_run_at, .. } => {
                (*next_run_at - self.clock.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            }
        }
    }

    /// Ticks until `shutdown` is cancelled. A run in progress finishes first.
    pub async fn run(&self, shutdown: CancellationToken) {
        let pipeline_id = self.pipeline_id();
        info!(pipeline = %pipeline_id, "Starting scheduler loop");

        loop {
            let outcome = self.tick().await;
            let wait = self.wait_after(&outcome);
            metrics::set_next_tick_in(pipeline_id.as_str(), wait);
            debug!(pipeline = %pipeline_id, ?outcome, ?wait, "Scheduler sleeping");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.wake.notified() => {
                    debug!(pipeline = %pipeline_id, "Scheduler woken");
                }
                _ = shutdown.cancelled() => {
                    break;
                }
            }
        }

        self.set_state(SchedulerState::Idle).await;
        info!(pipeline = %pipeline_id, "Scheduler loop stopped");
    }
}

/// Owns one scheduler loop per pipeline.
pub struct AutomationScheduler {
    schedulers: Vec<Arc<PipelineScheduler>>,
    shutdown_token: CancellationToken,
}

impl AutomationScheduler {
    pub fn pipeline_count(&self) -> usize {
        self.schedulers.len()
    }

    pub fn schedulers(&self) -> &[Arc<PipelineScheduler>] {
        &self.schedulers
    }

    /// Spawns every loop and waits for shutdown.
    pub async fn run(self) {
        info!(
            "Starting automation scheduler with {} pipelines",
            self.schedulers.len()
        );

        let handles: Vec<(PipelineId, JoinHandle<()>)> = self
            .schedulers
            .iter()
            .map(|scheduler| {
                let scheduler = Arc::clone(scheduler);
                let token = self.shutdown_token.child_token();
                let pipeline_id = scheduler.pipeline_id();
                (
                    pipeline_id,
                    tokio::spawn(async move { scheduler.run(token).await }),
                )
            })
            .collect();

        self.shutdown_token.cancelled().await;
        info!("Shutting down automation scheduler...");

        for (pipeline_id, handle) in handles {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(pipeline = %pipeline_id, "Scheduler loop panicked: {}", e),
                Err(_) => warn!(pipeline = %pipeline_id, "Scheduler loop did not stop in time"),
            }
        }
        info!("Automation scheduler stopped");
    }
}

/// Create the scheduler supervisor and its handle.
pub fn create_scheduler(
    pipelines: Vec<Arc<dyn Pipeline>>,
    automation_store: Arc<dyn AutomationStore>,
    runner: Arc<PipelineRunner>,
    disabled_recheck: Duration,
    shutdown_token: CancellationToken,
) -> (AutomationScheduler, SchedulerHandle) {
    let shared_state = Arc::new(RwLock::new(SharedSchedulerState::new()));
    let wakers: HashMap<PipelineId, Arc<Notify>> = pipelines
        .iter()
        .map(|p| (p.id(), Arc::new(Notify::new())))
        .collect();
    let wakers = Arc::new(wakers);

    let schedulers = pipelines
        .iter()
        .map(|pipeline| {
            Arc::new(PipelineScheduler::new(
                Arc::clone(pipeline),
                Arc::clone(&automation_store),
                Arc::clone(&runner),
                disabled_recheck,
                Arc::clone(&shared_state),
                Arc::clone(&wakers[&pipeline.id()]),
            ))
        })
        .collect();

    let handle = SchedulerHandle::new(
        pipelines,
        shared_state,
        wakers,
        automation_store,
        runner.guards().clone(),
    );

    (
        AutomationScheduler {
            schedulers,
            shutdown_token,
        },
        handle,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::test_support::{harness, StubPipeline};
    use crate::automation_store::{Cadence, PipelineSettings, SettingsPatch};
    use chrono::Duration as ChronoDuration;

    fn enabled(
        pipeline_id: PipelineId,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> PipelineSettings {
        PipelineSettings {
            enabled: true,
            last_run_at,
            next_run_at,
            ..PipelineSettings::defaults(pipeline_id)
        }
    }

    fn scheduler_for(
        h: &crate::automation::test_support::Harness,
        pipeline: Arc<StubPipeline>,
    ) -> PipelineScheduler {
        PipelineScheduler::new(
            pipeline,
            Arc::clone(&h.automation_store),
            Arc::clone(&h.runner),
            Duration::from_secs(3600),
            Arc::new(RwLock::new(SharedSchedulerState::new())),
            Arc::new(Notify::new()),
        )
    }

    #[tokio::test]
    async fn test_overdue_pipeline_runs_and_reschedules() {
        let h = harness();
        let t = h.clock.now();
        h.automation_store
            .seed_settings(&enabled(
                PipelineId::CatalogSync,
                Some(t),
                Some(t + ChronoDuration::hours(24)),
            ))
            .unwrap();
        let pipeline = Arc::new(StubPipeline::new(PipelineId::CatalogSync));
        let scheduler = scheduler_for(&h, Arc::clone(&pipeline));

        h.clock.advance(ChronoDuration::hours(25));
        let outcome = scheduler.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Ran {
                status: RunStatus::Success,
                next_run_at: t + ChronoDuration::hours(49),
            }
        );
        assert_eq!(pipeline.runs(), 1);

        let settings = h.automation_store.get_settings(PipelineId::CatalogSync).unwrap();
        assert_eq!(settings.last_run_at, Some(t + ChronoDuration::hours(25)));
        assert_eq!(settings.next_run_at, Some(t + ChronoDuration::hours(49)));

        let last = h
            .automation_store
            .get_last_run(PipelineId::CatalogSync)
            .unwrap()
            .unwrap();
        assert_eq!(last.triggered_by, RunTrigger::Schedule);

        // Not due again until the new window opens.
        let outcome = scheduler.tick().await;
        assert!(matches!(outcome, TickOutcome::Waiting { .. }));
        assert_eq!(scheduler.wait_after(&outcome), Duration::from_secs(24 * 3600));
        assert_eq!(pipeline.runs(), 1);
    }

    #[tokio::test]
    async fn test_disabling_while_waiting_suppresses_the_run() {
        let h = harness();
        let t = h.clock.now();
        h.automation_store
            .seed_settings(&enabled(
                PipelineId::ReviewGeneration,
                None,
                Some(t + ChronoDuration::hours(1)),
            ))
            .unwrap();
        let pipeline = Arc::new(StubPipeline::new(PipelineId::ReviewGeneration));
        let scheduler = scheduler_for(&h, Arc::clone(&pipeline));

        assert!(matches!(scheduler.tick().await, TickOutcome::Waiting { .. }));

        h.automation_store
            .update_settings(
                PipelineId::ReviewGeneration,
                &SettingsPatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        h.clock.advance(ChronoDuration::hours(2));

        let outcome = scheduler.tick().await;
        assert_eq!(outcome, TickOutcome::Disabled);
        assert_eq!(scheduler.wait_after(&outcome), Duration::from_secs(3600));
        assert_eq!(pipeline.runs(), 0);
        assert_eq!(
            h.automation_store
                .count_runs(Some(PipelineId::ReviewGeneration))
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_unset_next_run_is_computed_and_persisted() {
        let h = harness();
        let t = h.clock.now();
        h.automation_store
            .seed_settings(&enabled(PipelineId::ContentGeneration, None, None))
            .unwrap();
        let pipeline = Arc::new(StubPipeline::new(PipelineId::ContentGeneration));
        let scheduler = scheduler_for(&h, Arc::clone(&pipeline));

        let outcome = scheduler.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Waiting {
                next_run_at: t + ChronoDuration::hours(24)
            }
        );
        let settings = h
            .automation_store
            .get_settings(PipelineId::ContentGeneration)
            .unwrap();
        assert_eq!(settings.next_run_at, Some(t + ChronoDuration::hours(24)));
        assert_eq!(pipeline.runs(), 0);
    }

    #[tokio::test]
    async fn test_recadenced_pipeline_catches_up() {
        let h = harness();
        let t = h.clock.now();
        h.automation_store
            .seed_settings(&PipelineSettings {
                cadence: Cadence::Weekly,
                ..enabled(
                    PipelineId::SeoOptimization,
                    Some(t - ChronoDuration::days(3)),
                    Some(t + ChronoDuration::days(4)),
                )
            })
            .unwrap();
        let pipeline = Arc::new(StubPipeline::new(PipelineId::SeoOptimization));
        let scheduler = scheduler_for(&h, Arc::clone(&pipeline));

        // Weekly to daily: the next run is recomputed from the last run.
        h.automation_store
            .update_settings(
                PipelineId::SeoOptimization,
                &SettingsPatch {
                    cadence: Some(Cadence::Daily),
                    ..Default::default()
                },
            )
            .unwrap();

        let outcome = scheduler.tick().await;
        assert!(matches!(outcome, TickOutcome::Ran { .. }));
        assert_eq!(pipeline.runs(), 1);
    }

    #[tokio::test]
    async fn test_failed_run_still_reschedules() {
        let h = harness();
        let t = h.clock.now();
        h.automation_store
            .seed_settings(&enabled(PipelineId::CatalogSync, None, Some(t)))
            .unwrap();
        let pipeline = Arc::new(StubPipeline::failing(PipelineId::CatalogSync));
        let scheduler = scheduler_for(&h, Arc::clone(&pipeline));

        let outcome = scheduler.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Ran {
                status: RunStatus::Error,
                next_run_at: t + ChronoDuration::hours(24),
            }
        );
        let record = h
            .automation_store
            .get_last_run(PipelineId::CatalogSync)
            .unwrap()
            .unwrap();
        assert_eq!((record.added, record.skipped, record.errors), (0, 0, 1));
    }

    #[tokio::test]
    async fn test_supervisor_runs_due_pipelines_until_shutdown() {
        let h = harness();
        let t = h.clock.now();
        h.automation_store
            .seed_settings(&enabled(PipelineId::CatalogSync, None, Some(t)))
            .unwrap();
        let due = Arc::new(StubPipeline::new(PipelineId::CatalogSync));
        let disabled = Arc::new(StubPipeline::new(PipelineId::ReviewGeneration));

        let shutdown = CancellationToken::new();
        let (scheduler, handle) = create_scheduler(
            vec![
                Arc::clone(&due) as Arc<dyn Pipeline>,
                Arc::clone(&disabled) as Arc<dyn Pipeline>,
            ],
            Arc::clone(&h.automation_store),
            Arc::clone(&h.runner),
            Duration::from_secs(3600),
            shutdown.clone(),
        );
        assert_eq!(scheduler.pipeline_count(), 2);
        let task = tokio::spawn(scheduler.run());

        let ledger = Arc::clone(&h.automation_store);
        for _ in 0..200 {
            if ledger.count_runs(Some(PipelineId::CatalogSync)).unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(due.runs(), 1);
        assert_eq!(disabled.runs(), 0);

        let statuses = handle.statuses().await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(
            statuses[0].last_run.as_ref().map(|r| r.triggered_by),
            Some(RunTrigger::Schedule)
        );
        assert!(statuses[1].last_run.is_none());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            handle.state(PipelineId::CatalogSync).await,
            SchedulerState::Idle
        );
    }

    #[tokio::test]
    async fn test_settings_change_wakes_the_loop() {
        let h = harness();
        let pipeline = Arc::new(StubPipeline::new(PipelineId::CatalogSync));
        let shutdown = CancellationToken::new();
        let (scheduler, handle) = create_scheduler(
            vec![Arc::clone(&pipeline) as Arc<dyn Pipeline>],
            Arc::clone(&h.automation_store),
            Arc::clone(&h.runner),
            Duration::from_secs(3600),
            shutdown.clone(),
        );
        let task = tokio::spawn(scheduler.run());

        // Disabled by default: the loop sleeps for the recheck interval.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let t = h.clock.now();
        h.automation_store
            .seed_settings(&enabled(PipelineId::CatalogSync, None, Some(t)))
            .unwrap();
        handle
            .update_settings(
                PipelineId::CatalogSync,
                &SettingsPatch {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        for _ in 0..200 {
            if h.automation_store.count_runs(None).unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(pipeline.runs(), 1);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
