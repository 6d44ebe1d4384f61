mod models;
mod schema;
mod sqlite_automation_store;

pub use models::*;
pub use schema::AUTOMATION_VERSIONED_SCHEMAS;
pub use sqlite_automation_store::SqliteAutomationStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

/// Largest page the run-history query will return.
pub const MAX_HISTORY_PAGE_SIZE: usize = 200;

/// Settings store and run ledger.
///
/// The ledger side is append-only: there is deliberately no way to update or
/// delete a [`RunRecord`] through this trait.
pub trait AutomationStore: Send + Sync {
    // Settings
    /// Loads settings for a pipeline, applying defaults when no row exists.
    fn get_settings(&self, pipeline_id: PipelineId) -> Result<PipelineSettings>;
    fn get_all_settings(&self) -> Result<Vec<PipelineSettings>>;
    /// Writes `settings` only if the pipeline has no row yet. Returns whether it did.
    fn seed_settings(&self, settings: &PipelineSettings) -> Result<bool>;
    /// Operator-facing update. Changing the cadence clears `next_run_at` so the
    /// scheduler recomputes it from `last_run_at` on its next tick.
    fn update_settings(
        &self,
        pipeline_id: PipelineId,
        patch: &SettingsPatch,
    ) -> Result<PipelineSettings>;

    // Schedule bookkeeping, written only by the scheduler loop
    fn record_schedule(
        &self,
        pipeline_id: PipelineId,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()>;
    fn set_next_run_at(&self, pipeline_id: PipelineId, next_run_at: DateTime<Utc>) -> Result<()>;

    // Run ledger
    fn append_run(&self, run: &NewRunRecord) -> Result<RunRecord>;
    /// Newest first. `page` is 1-based.
    fn list_runs(
        &self,
        pipeline_id: Option<PipelineId>,
        page: usize,
        page_size: usize,
    ) -> Result<RunHistoryPage>;
    fn get_last_run(&self, pipeline_id: PipelineId) -> Result<Option<RunRecord>>;
    fn count_runs(&self, pipeline_id: Option<PipelineId>) -> Result<usize>;
}
