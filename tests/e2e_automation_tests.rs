//! End-to-end tests driving the real pipelines against SQLite stores.
//!
//! The generator is faked; everything else (stores, runner, scheduler,
//! orchestrator) is the production wiring.

mod common;

use chrono::Duration;
use common::{
    FakeGenerator, TestEnv, CATALOG_REPLY, CONTENT_REPLY, REVIEW_REPLY, SEO_REPLY,
};
use content_autopilot::automation::{PipelineScheduler, TickOutcome};
use content_autopilot::automation_store::{
    Cadence, PipelineId, PipelineSettings, RunStatus, RunTrigger, SettingsPatch,
};
use content_autopilot::content_store::{NewContentTemplate, PerformanceMetrics};
use content_autopilot::llm::GenerationError;
use std::sync::Arc;

fn happy_generator() -> FakeGenerator {
    FakeGenerator::by_pipeline(CATALOG_REPLY, REVIEW_REPLY, CONTENT_REPLY, SEO_REPLY)
}

fn scheduler_for(
    schedulers: &[Arc<PipelineScheduler>],
    pipeline_id: PipelineId,
) -> Arc<PipelineScheduler> {
    schedulers
        .iter()
        .find(|s| s.pipeline_id() == pipeline_id)
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn test_run_all_feeds_every_stage() {
    let env = TestEnv::new(happy_generator());
    for pipeline_id in PipelineId::ALL {
        env.enable(pipeline_id);
    }
    env.add_template("Weekly roundup", 7);

    let report = env.orchestrator().run_all().await;
    assert!(report.success);

    let catalog = &report.per_pipeline[&PipelineId::CatalogSync];
    assert_eq!(catalog.counts(), (2, 1, 0));
    let reviews = &report.per_pipeline[&PipelineId::ReviewGeneration];
    assert_eq!(reviews.counts(), (2, 0, 0));
    let content = &report.per_pipeline[&PipelineId::ContentGeneration];
    assert_eq!(content.counts(), (1, 0, 0));
    // The new content is still a draft.
    let seo = &report.per_pipeline[&PipelineId::SeoOptimization];
    assert_eq!(seo.counts(), (0, 0, 0));

    let counts = env.content_store.counts().unwrap();
    assert_eq!(counts.tools, 2);
    assert_eq!(counts.reviews, 2);
    assert_eq!(counts.generated_content, 1);
    assert_eq!(counts.optimizations, 0);

    let history = env.automation_store.list_runs(None, 1, 50).unwrap();
    assert_eq!(history.total_count, 4);
    for record in &history.records {
        assert_eq!(record.triggered_by, RunTrigger::Manual);
        let result = &report.per_pipeline[&record.pipeline_id];
        assert_eq!(
            (record.added, record.skipped, record.errors),
            result.counts()
        );
    }
}

#[tokio::test]
async fn test_published_content_gets_optimized_once() {
    let env = TestEnv::new(happy_generator());
    env.enable(PipelineId::ContentGeneration);
    env.enable(PipelineId::SeoOptimization);
    env.add_template("Weekly roundup", 7);

    env.orchestrator().run_all().await;
    let metrics = PerformanceMetrics {
        views: 120,
        clicks: 8,
        conversions: 1,
    };
    env.content_store.publish_content(1, env.now()).unwrap();
    env.content_store.record_content_metrics(1, &metrics).unwrap();

    let report = env.orchestrator().run_all().await;
    assert_eq!(
        report.per_pipeline[&PipelineId::SeoOptimization].counts(),
        (1, 0, 0)
    );
    let optimization = env
        .content_store
        .get_optimization_for_content(1)
        .unwrap()
        .unwrap();
    assert_eq!(optimization.title, "Best AI Writing Tools");
    assert_eq!(optimization.h1, "AI Writing Tools");
    assert_eq!(optimization.baseline, metrics);

    // Optimized content is no longer eligible.
    let report = env.orchestrator().run_all().await;
    assert_eq!(
        report.per_pipeline[&PipelineId::SeoOptimization].counts(),
        (0, 0, 0)
    );
}

#[tokio::test]
async fn test_catalog_sync_is_idempotent() {
    let env = TestEnv::new(happy_generator());
    env.enable(PipelineId::CatalogSync);

    let first = env.orchestrator().run_all().await;
    let second = env.orchestrator().run_all().await;

    assert_eq!(first.per_pipeline[&PipelineId::CatalogSync].added, 2);
    let again = &second.per_pipeline[&PipelineId::CatalogSync];
    assert_eq!(again.counts(), (0, 3, 0));
    assert_eq!(env.content_store.counts().unwrap().tools, 2);
}

#[tokio::test]
async fn test_unparseable_catalog_reply_uses_builtin_entries() {
    let env = TestEnv::new(FakeGenerator::new(|_| {
        Ok("I cannot help with that.".to_string())
    }));
    env.enable(PipelineId::CatalogSync);

    let report = env.orchestrator().run_all().await;
    let catalog = &report.per_pipeline[&PipelineId::CatalogSync];
    assert!(catalog.degraded);
    assert!(catalog.added > 0);
    assert_eq!(catalog.errors, 0);

    let last = env
        .automation_store
        .get_last_run(PipelineId::CatalogSync)
        .unwrap()
        .unwrap();
    assert_eq!(last.status, RunStatus::Partial);
}

#[tokio::test]
async fn test_missing_credentials_fail_the_run_not_the_items() {
    let env = TestEnv::new(FakeGenerator::new(|_| {
        Err(GenerationError::NotConfigured("no api key".to_string()))
    }));
    env.enable(PipelineId::CatalogSync);
    env.enable(PipelineId::ContentGeneration);
    env.add_template("Weekly roundup", 7);
    env.add_template("Monthly digest", 30);

    let report = env.orchestrator().run_all().await;

    assert!(!report.success);
    assert!(!report.per_pipeline.contains_key(&PipelineId::ReviewGeneration));
    assert!(!report.per_pipeline.contains_key(&PipelineId::SeoOptimization));
    for pipeline_id in [PipelineId::CatalogSync, PipelineId::ContentGeneration] {
        assert_eq!(report.per_pipeline[&pipeline_id].counts(), (0, 0, 1));
        let last = env
            .automation_store
            .get_last_run(pipeline_id)
            .unwrap()
            .unwrap();
        assert_eq!(last.status, RunStatus::Error);
        assert!(last.error_detail.unwrap().contains("not configured"));
    }
    // Both templates stay eligible for the next run.
    assert_eq!(env.content_store.due_templates(env.now(), 10).unwrap().len(), 2);
}

#[tokio::test]
async fn test_item_failures_are_counted_and_the_batch_continues() {
    let env = TestEnv::new(FakeGenerator::new(|request| {
        if request.prompt.contains("digest") {
            Err(GenerationError::RateLimited)
        } else {
            Ok(CONTENT_REPLY.to_string())
        }
    }));
    env.enable(PipelineId::ContentGeneration);
    env.add_template("Weekly roundup", 7);
    let digest = env
        .content_store
        .insert_template(&NewContentTemplate {
            name: "Digest".to_string(),
            content_type: "newsletter".to_string(),
            body: "Write the monthly digest".to_string(),
            keywords: vec![],
            frequency_days: 30,
            active: true,
        })
        .unwrap();

    let report = env.orchestrator().run_all().await;
    assert_eq!(
        report.per_pipeline[&PipelineId::ContentGeneration].counts(),
        (1, 0, 1)
    );
    assert!(report.success);

    let last = env
        .automation_store
        .get_last_run(PipelineId::ContentGeneration)
        .unwrap()
        .unwrap();
    assert_eq!(last.status, RunStatus::Partial);
    assert!(last.error_detail.unwrap().contains("Rate limited"));

    // The failed template stays eligible.
    let due = env.content_store.due_templates(env.now(), 10).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, digest.id);
}

#[tokio::test]
async fn test_recent_template_is_not_selected() {
    let env = TestEnv::new(happy_generator());
    env.enable(PipelineId::ContentGeneration);
    let template = env.add_template("Weekly roundup", 7);
    env.content_store
        .mark_template_generated(template.id, None, env.now() - Duration::days(3))
        .unwrap();

    let report = env.orchestrator().run_all().await;
    assert_eq!(
        report.per_pipeline[&PipelineId::ContentGeneration].counts(),
        (0, 0, 0)
    );
    assert_eq!(env.generator.calls(), 0);

    env.clock.advance(Duration::days(4) + Duration::hours(1));
    let report = env.orchestrator().run_all().await;
    assert_eq!(
        report.per_pipeline[&PipelineId::ContentGeneration].counts(),
        (1, 0, 0)
    );
}

#[tokio::test]
async fn test_ledger_is_append_only() {
    let env = TestEnv::new(happy_generator());
    env.enable(PipelineId::CatalogSync);

    env.orchestrator().run_all().await;
    let first = env
        .automation_store
        .get_last_run(PipelineId::CatalogSync)
        .unwrap()
        .unwrap();

    for _ in 0..3 {
        env.clock.advance(Duration::minutes(5));
        env.orchestrator().run_all().await;
    }

    let history = env
        .automation_store
        .list_runs(Some(PipelineId::CatalogSync), 1, 10)
        .unwrap();
    assert_eq!(history.total_count, 4);
    // Newest first; the oldest row is unchanged.
    assert_eq!(history.records.last().unwrap(), &first);
    assert!(history
        .records
        .windows(2)
        .all(|w| w[0].started_at >= w[1].started_at));
}

#[tokio::test]
async fn test_disabled_pipeline_never_runs_on_schedule() {
    let env = TestEnv::new(happy_generator());
    env.seed(PipelineSettings {
        enabled: false,
        next_run_at: Some(env.now() - Duration::hours(1)),
        ..PipelineSettings::defaults(PipelineId::CatalogSync)
    });
    let (scheduler, _handle) = env.scheduler();
    let catalog = scheduler_for(scheduler.schedulers(), PipelineId::CatalogSync);

    assert_eq!(catalog.tick().await, TickOutcome::Disabled);
    assert_eq!(env.generator.calls(), 0);
    assert_eq!(
        env.automation_store
            .count_runs(Some(PipelineId::CatalogSync))
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_overdue_pipeline_reschedules_from_actual_run_time() {
    let env = TestEnv::new(happy_generator());
    let t = env.now();
    env.seed(PipelineSettings {
        enabled: true,
        last_run_at: Some(t),
        next_run_at: Some(t + Duration::hours(24)),
        ..PipelineSettings::defaults(PipelineId::CatalogSync)
    });
    let (scheduler, _handle) = env.scheduler();
    let catalog = scheduler_for(scheduler.schedulers(), PipelineId::CatalogSync);

    env.clock.set(t + Duration::hours(25));
    let outcome = catalog.tick().await;
    assert_eq!(
        outcome,
        TickOutcome::Ran {
            status: RunStatus::Success,
            next_run_at: t + Duration::hours(49),
        }
    );

    let settings = env
        .automation_store
        .get_settings(PipelineId::CatalogSync)
        .unwrap();
    assert_eq!(settings.last_run_at, Some(t + Duration::hours(25)));
    assert_eq!(settings.next_run_at, Some(t + Duration::hours(49)));

    let last = env
        .automation_store
        .get_last_run(PipelineId::CatalogSync)
        .unwrap()
        .unwrap();
    assert_eq!(last.triggered_by, RunTrigger::Schedule);
}

#[tokio::test]
async fn test_status_reflects_settings_changes() {
    let env = TestEnv::new(happy_generator());
    let (_scheduler, handle) = env.scheduler();

    let statuses = handle.statuses().await.unwrap();
    assert_eq!(statuses.len(), 4);
    assert!(statuses.iter().all(|s| !s.settings.enabled && !s.is_running));

    handle
        .update_settings(
            PipelineId::SeoOptimization,
            &SettingsPatch {
                enabled: Some(true),
                cadence: Some(Cadence::Monthly),
                ..Default::default()
            },
        )
        .unwrap();

    let statuses = handle.statuses().await.unwrap();
    let seo = statuses
        .iter()
        .find(|s| s.pipeline_id == PipelineId::SeoOptimization)
        .unwrap();
    assert!(seo.settings.enabled);
    assert_eq!(seo.settings.cadence, Cadence::Monthly);
    assert!(seo.last_run.is_none());
}
