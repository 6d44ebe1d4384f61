use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

// =============================================================================
// Pipeline identity and cadence
// =============================================================================

/// The four automation pipelines.
///
/// Declaration order is the order the orchestrator runs them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineId {
    CatalogSync,
    ReviewGeneration,
    ContentGeneration,
    SeoOptimization,
}

impl PipelineId {
    pub const ALL: [PipelineId; 4] = [
        PipelineId::CatalogSync,
        PipelineId::ReviewGeneration,
        PipelineId::ContentGeneration,
        PipelineId::SeoOptimization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineId::CatalogSync => "catalog_sync",
            PipelineId::ReviewGeneration => "review_generation",
            PipelineId::ContentGeneration => "content_generation",
            PipelineId::SeoOptimization => "seo_optimization",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "catalog_sync" => Some(PipelineId::CatalogSync),
            "review_generation" => Some(PipelineId::ReviewGeneration),
            "content_generation" => Some(PipelineId::ContentGeneration),
            "seo_optimization" => Some(PipelineId::SeoOptimization),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recurrence interval of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    /// Fixed-length interval. Months are 30 days so that
    /// `next_run_at == last_run_at + interval` holds exactly.
    pub fn interval(&self) -> Duration {
        match self {
            Cadence::Daily => Duration::hours(24),
            Cadence::Weekly => Duration::days(7),
            Cadence::Monthly => Duration::days(30),
        }
    }

    pub fn next_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + self.interval()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Cadence::Daily),
            "weekly" => Some(Cadence::Weekly),
            "monthly" => Some(Cadence::Monthly),
            _ => None,
        }
    }
}

// =============================================================================
// Batch parameters
// =============================================================================

/// How many categories the review pipeline samples per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategorySelection {
    All(AllMarker),
    Count(usize),
}

/// Serializes as the literal string `"all"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllMarker {
    All,
}

impl CategorySelection {
    pub fn all() -> Self {
        CategorySelection::All(AllMarker::All)
    }
}

impl Default for CategorySelection {
    fn default() -> Self {
        CategorySelection::Count(3)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSyncParams {
    pub entries_per_run: usize,
}

impl Default for CatalogSyncParams {
    fn default() -> Self {
        Self { entries_per_run: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewGenerationParams {
    pub categories_per_run: CategorySelection,
    pub tools_per_category: usize,
}

impl Default for ReviewGenerationParams {
    fn default() -> Self {
        Self {
            categories_per_run: CategorySelection::default(),
            tools_per_category: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentGenerationParams {
    pub templates_per_run: usize,
}

impl Default for ContentGenerationParams {
    fn default() -> Self {
        Self {
            templates_per_run: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeoOptimizationParams {
    pub contents_per_run: usize,
}

impl Default for SeoOptimizationParams {
    fn default() -> Self {
        Self {
            contents_per_run: 10,
        }
    }
}

/// Per-pipeline batch sizing. The variant always matches the owning pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BatchParams {
    CatalogSync(CatalogSyncParams),
    ReviewGeneration(ReviewGenerationParams),
    ContentGeneration(ContentGenerationParams),
    SeoOptimization(SeoOptimizationParams),
}

impl BatchParams {
    pub fn default_for(pipeline_id: PipelineId) -> Self {
        match pipeline_id {
            PipelineId::CatalogSync => BatchParams::CatalogSync(Default::default()),
            PipelineId::ReviewGeneration => BatchParams::ReviewGeneration(Default::default()),
            PipelineId::ContentGeneration => BatchParams::ContentGeneration(Default::default()),
            PipelineId::SeoOptimization => BatchParams::SeoOptimization(Default::default()),
        }
    }

    /// Parses a stored JSON payload using the schema of `pipeline_id`.
    ///
    /// Missing fields take their defaults. A payload that does not parse at
    /// all is replaced by the full default set.
    pub fn from_json(pipeline_id: PipelineId, json: Option<&str>) -> Self {
        let Some(json) = json.filter(|s| !s.trim().is_empty()) else {
            return Self::default_for(pipeline_id);
        };
        let parsed = match pipeline_id {
            PipelineId::CatalogSync => serde_json::from_str(json).map(BatchParams::CatalogSync),
            PipelineId::ReviewGeneration => {
                serde_json::from_str(json).map(BatchParams::ReviewGeneration)
            }
            PipelineId::ContentGeneration => {
                serde_json::from_str(json).map(BatchParams::ContentGeneration)
            }
            PipelineId::SeoOptimization => {
                serde_json::from_str(json).map(BatchParams::SeoOptimization)
            }
        };
        parsed.unwrap_or_else(|e| {
            warn!(
                pipeline = %pipeline_id,
                error = %e,
                "Invalid batch params payload, using defaults"
            );
            Self::default_for(pipeline_id)
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn catalog_sync(&self) -> CatalogSyncParams {
        match self {
            BatchParams::CatalogSync(p) => p.clone(),
            _ => CatalogSyncParams::default(),
        }
    }

    pub fn review_generation(&self) -> ReviewGenerationParams {
        match self {
            BatchParams::ReviewGeneration(p) => p.clone(),
            _ => ReviewGenerationParams::default(),
        }
    }

    pub fn content_generation(&self) -> ContentGenerationParams {
        match self {
            BatchParams::ContentGeneration(p) => p.clone(),
            _ => ContentGenerationParams::default(),
        }
    }

    pub fn seo_optimization(&self) -> SeoOptimizationParams {
        match self {
            BatchParams::SeoOptimization(p) => p.clone(),
            _ => SeoOptimizationParams::default(),
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Stored configuration and schedule bookkeeping for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSettings {
    pub pipeline_id: PipelineId,
    pub enabled: bool,
    pub cadence: Cadence,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub batch_params: BatchParams,
}

impl PipelineSettings {
    /// Settings used when no row exists yet: disabled, daily, default batch sizes.
    pub fn defaults(pipeline_id: PipelineId) -> Self {
        Self {
            pipeline_id,
            enabled: false,
            cadence: Cadence::Daily,
            last_run_at: None,
            next_run_at: None,
            batch_params: BatchParams::default_for(pipeline_id),
        }
    }
}

/// Operator-side change to a pipeline's settings. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub enabled: Option<bool>,
    pub cadence: Option<Cadence>,
    pub batch_params: Option<BatchParams>,
}

// =============================================================================
// Run ledger
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(RunStatus::Success),
            "partial" => Some(RunStatus::Partial),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Schedule,
    Manual,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Schedule => "schedule",
            RunTrigger::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "schedule" => Some(RunTrigger::Schedule),
            "manual" => Some(RunTrigger::Manual),
            _ => None,
        }
    }
}

/// A run about to be appended to the ledger.
#[derive(Debug, Clone)]
pub struct NewRunRecord {
    pub pipeline_id: PipelineId,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub status: RunStatus,
    pub triggered_by: RunTrigger,
    pub added: u32,
    pub skipped: u32,
    pub errors: u32,
    pub error_detail: Option<String>,
}

/// One immutable ledger row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: i64,
    pub pipeline_id: PipelineId,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub status: RunStatus,
    pub triggered_by: RunTrigger,
    pub added: u32,
    pub skipped: u32,
    pub errors: u32,
    pub error_detail: Option<String>,
}

/// One page of ledger rows plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
pub struct RunHistoryPage {
    pub records: Vec<RunRecord>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
}
