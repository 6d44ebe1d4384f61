use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTool {
    pub slug: String,
    pub name: String,
    pub category_id: i64,
    pub description: String,
    pub website_url: Option<String>,
    pub pricing: Option<String>,
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tool {
    pub id: i64,
    /// Natural key, unique across the catalog.
    pub slug: String,
    pub name: String,
    pub category_id: i64,
    pub description: String,
    pub website_url: Option<String>,
    pub pricing: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Reviews
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub tool_id: i64,
    pub rating: f64,
    pub summary: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub verdict: String,
}

/// At most one review exists per tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub id: i64,
    pub tool_id: i64,
    pub rating: f64,
    pub summary: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub verdict: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Content templates and generated content
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContentTemplate {
    pub name: String,
    pub content_type: String,
    pub body: String,
    pub keywords: Vec<String>,
    pub frequency_days: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentTemplate {
    pub id: i64,
    pub name: String,
    pub content_type: String,
    /// Prompt body sent to the generator.
    pub body: String,
    pub keywords: Vec<String>,
    pub frequency_days: u32,
    pub active: bool,
    pub last_generated_at: Option<DateTime<Utc>>,
}

impl ContentTemplate {
    /// A template is due when it never ran, or when
    /// `last_generated_at + frequency_days` is strictly before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match self.last_generated_at {
            None => true,
            Some(last) => last + Duration::days(self.frequency_days as i64) < now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ContentStatus::Draft),
            "published" => Some(ContentStatus::Published),
            _ => None,
        }
    }
}

/// Traffic counters tracked per published piece of content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PerformanceMetrics {
    pub views: i64,
    pub clicks: i64,
    pub conversions: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGeneratedContent {
    pub template_id: Option<i64>,
    pub title: String,
    pub body: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedContent {
    pub id: i64,
    pub template_id: Option<i64>,
    pub title: String,
    pub body: String,
    pub content_type: String,
    pub status: ContentStatus,
    pub metrics: PerformanceMetrics,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

// =============================================================================
// SEO optimizations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    Pending,
    Applied,
    Rejected,
}

impl OptimizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationStatus::Pending => "pending",
            OptimizationStatus::Applied => "applied",
            OptimizationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OptimizationStatus::Pending),
            "applied" => Some(OptimizationStatus::Applied),
            "rejected" => Some(OptimizationStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSeoOptimization {
    pub content_id: i64,
    pub title: String,
    pub meta_description: String,
    pub keywords: Vec<String>,
    pub h1: String,
    /// Snapshot of the content's metrics at suggestion time, for before/after comparison.
    pub baseline: PerformanceMetrics,
}

/// At most one optimization exists per content record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeoOptimization {
    pub id: i64,
    pub content_id: i64,
    pub title: String,
    pub meta_description: String,
    pub keywords: Vec<String>,
    pub h1: String,
    pub status: OptimizationStatus,
    pub baseline: PerformanceMetrics,
    pub created_at: DateTime<Utc>,
}

/// Row counts, used for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentCounts {
    pub categories: usize,
    pub tools: usize,
    pub reviews: usize,
    pub templates: usize,
    pub generated_content: usize,
    pub optimizations: usize,
}
