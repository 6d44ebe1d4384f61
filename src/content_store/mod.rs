mod models;
mod schema;
mod sqlite_content_store;

pub use models::*;
pub use schema::CONTENT_VERSIONED_SCHEMAS;
pub use sqlite_content_store::SqliteContentStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the content store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The insert hit a uniqueness constraint; the record already exists.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Classifies a rusqlite error, turning UNIQUE/PRIMARY KEY violations into
    /// [`StoreError::Duplicate`].
    pub(crate) fn from_insert(err: rusqlite::Error, what: impl Into<String>) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return StoreError::Duplicate(what.into());
            }
        }
        StoreError::Database(err)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent store for the records the pipelines read and produce.
///
/// Each entity exposes an existence check on its natural key, an insert, the
/// updates the pipelines need, and the eligibility queries that feed work
/// selection. Inserts that violate a natural-key constraint fail with
/// [`StoreError::Duplicate`].
pub trait ContentStore: Send + Sync {
    // Categories
    /// Returns the category with `slug`, creating it with `name` when missing.
    fn get_or_create_category(&self, slug: &str, name: &str) -> StoreResult<Category>;
    fn list_categories(&self) -> StoreResult<Vec<Category>>;

    // Tools
    fn tool_exists_by_slug(&self, slug: &str) -> StoreResult<bool>;
    fn insert_tool(&self, tool: &NewTool) -> StoreResult<Tool>;
    /// Tools in `category_id` that have no review yet, oldest first.
    fn tools_without_review(&self, category_id: i64, limit: usize) -> StoreResult<Vec<Tool>>;

    // Reviews
    fn review_exists(&self, tool_id: i64) -> StoreResult<bool>;
    fn insert_review(&self, review: &NewReview) -> StoreResult<Review>;
    fn get_review_for_tool(&self, tool_id: i64) -> StoreResult<Option<Review>>;

    // Templates
    fn insert_template(&self, template: &NewContentTemplate) -> StoreResult<ContentTemplate>;
    fn get_template(&self, id: i64) -> StoreResult<Option<ContentTemplate>>;
    /// Active templates whose frequency window has elapsed at `now`, never-run first.
    fn due_templates(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<ContentTemplate>>;
    /// Moves `last_generated_at` from `previous` to `at`. Returns `false`,
    /// leaving the row alone, when the stored value is no longer `previous`.
    fn mark_template_generated(
        &self,
        id: i64,
        previous: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    // Generated content
    /// Inserts a draft with zeroed performance counters.
    fn insert_generated_content(
        &self,
        content: &NewGeneratedContent,
    ) -> StoreResult<GeneratedContent>;
    /// Inserts `content` and marks `template` generated at `at` in one
    /// transaction. Returns `None` without writing when another writer has
    /// already moved the template past the `last_generated_at` it was read with.
    fn insert_generated_content_for(
        &self,
        template: &ContentTemplate,
        content: &NewGeneratedContent,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<GeneratedContent>>;
    fn get_content(&self, id: i64) -> StoreResult<Option<GeneratedContent>>;
    fn publish_content(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;
    fn record_content_metrics(&self, id: i64, metrics: &PerformanceMetrics) -> StoreResult<()>;
    /// Published content that has no SEO optimization yet.
    fn content_without_optimization(&self, limit: usize) -> StoreResult<Vec<GeneratedContent>>;

    // SEO optimizations
    fn optimization_exists(&self, content_id: i64) -> StoreResult<bool>;
    fn insert_optimization(
        &self,
        optimization: &NewSeoOptimization,
    ) -> StoreResult<SeoOptimization>;
    fn get_optimization_for_content(&self, content_id: i64)
        -> StoreResult<Option<SeoOptimization>>;

    fn counts(&self) -> StoreResult<ContentCounts>;
}
