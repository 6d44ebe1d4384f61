use super::models::{
    Category, ContentCounts, ContentStatus, ContentTemplate, GeneratedContent, NewContentTemplate,
    NewGeneratedContent, NewReview, NewSeoOptimization, NewTool, OptimizationStatus,
    PerformanceMetrics, Review, SeoOptimization, Tool,
};
use super::schema::CONTENT_VERSIONED_SCHEMAS;
use super::{ContentStore, StoreError, StoreResult};
use crate::sqlite_persistence::open_versioned;
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const TOOL_COLUMNS: &str =
    "id, slug, name, category_id, description, website_url, pricing, created_at";
const TEMPLATE_COLUMNS: &str =
    "id, name, content_type, body, keywords, frequency_days, active, last_generated_at";
const CONTENT_COLUMNS: &str = "id, template_id, title, body, content_type, status, views, \
     clicks, conversions, created_at, published_at";
const OPTIMIZATION_COLUMNS: &str = "id, content_id, title, meta_description, keywords, h1, \
     status, baseline_views, baseline_clicks, baseline_conversions, created_at";

pub struct SqliteContentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteContentStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> anyhow::Result<Self> {
        let conn = open_versioned(db_path.as_ref(), "content", CONTENT_VERSIONED_SCHEMAS)
            .context("Failed to open content database")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn parse_list(raw: &str) -> Vec<String> {
        serde_json::from_str(raw).unwrap_or_default()
    }

    fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<Category> {
        Ok(Category {
            id: row.get("id")?,
            slug: row.get("slug")?,
            name: row.get("name")?,
        })
    }

    fn row_to_tool(row: &rusqlite::Row) -> rusqlite::Result<Tool> {
        let created_at: String = row.get("created_at")?;
        Ok(Tool {
            id: row.get("id")?,
            slug: row.get("slug")?,
            name: row.get("name")?,
            category_id: row.get("category_id")?,
            description: row.get("description")?,
            website_url: row.get("website_url")?,
            pricing: row.get("pricing")?,
            created_at: Self::parse_datetime(&created_at).unwrap_or_else(Utc::now),
        })
    }

    fn row_to_review(row: &rusqlite::Row) -> rusqlite::Result<Review> {
        let pros: String = row.get("pros")?;
        let cons: String = row.get("cons")?;
        let created_at: String = row.get("created_at")?;
        Ok(Review {
            id: row.get("id")?,
            tool_id: row.get("tool_id")?,
            rating: row.get("rating")?,
            summary: row.get("summary")?,
            pros: Self::parse_list(&pros),
            cons: Self::parse_list(&cons),
            verdict: row.get("verdict")?,
            created_at: Self::parse_datetime(&created_at).unwrap_or_else(Utc::now),
        })
    }

    fn row_to_template(row: &rusqlite::Row) -> rusqlite::Result<ContentTemplate> {
        let keywords: String = row.get("keywords")?;
        let active: i64 = row.get("active")?;
        let frequency_days: i64 = row.get("frequency_days")?;
        let last_generated_at: Option<String> = row.get("last_generated_at")?;
        Ok(ContentTemplate {
            id: row.get("id")?,
            name: row.get("name")?,
            content_type: row.get("content_type")?,
            body: row.get("body")?,
            keywords: Self::parse_list(&keywords),
            frequency_days: frequency_days.max(0) as u32,
            active: active != 0,
            last_generated_at: last_generated_at.as_deref().and_then(Self::parse_datetime),
        })
    }

    fn row_to_content(row: &rusqlite::Row) -> rusqlite::Result<GeneratedContent> {
        let status: String = row.get("status")?;
        let created_at: String = row.get("created_at")?;
        let published_at: Option<String> = row.get("published_at")?;
        Ok(GeneratedContent {
            id: row.get("id")?,
            template_id: row.get("template_id")?,
            title: row.get("title")?,
            body: row.get("body")?,
            content_type: row.get("content_type")?,
            status: ContentStatus::parse(&status).unwrap_or(ContentStatus::Draft),
            metrics: PerformanceMetrics {
                views: row.get("views")?,
                clicks: row.get("clicks")?,
                conversions: row.get("conversions")?,
            },
            created_at: Self::parse_datetime(&created_at).unwrap_or_else(Utc::now),
            published_at: published_at.as_deref().and_then(Self::parse_datetime),
        })
    }

    fn row_to_optimization(row: &rusqlite::Row) -> rusqlite::Result<SeoOptimization> {
        let keywords: String = row.get("keywords")?;
        let status: String = row.get("status")?;
        let created_at: String = row.get("created_at")?;
        Ok(SeoOptimization {
            id: row.get("id")?,
            content_id: row.get("content_id")?,
            title: row.get("title")?,
            meta_description: row.get("meta_description")?,
            keywords: Self::parse_list(&keywords),
            h1: row.get("h1")?,
            status: OptimizationStatus::parse(&status).unwrap_or(OptimizationStatus::Pending),
            baseline: PerformanceMetrics {
                views: row.get("baseline_views")?,
                clicks: row.get("baseline_clicks")?,
                conversions: row.get("baseline_conversions")?,
            },
            created_at: Self::parse_datetime(&created_at).unwrap_or_else(Utc::now),
        })
    }

    fn exists(conn: &Connection, sql: &str, key: &dyn rusqlite::ToSql) -> StoreResult<bool> {
        let found = conn
            .query_row(sql, params![key], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn count(conn: &Connection, table: &str) -> StoreResult<usize> {
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    fn compare_and_mark(
        conn: &Connection,
        id: i64,
        previous: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let changed = conn.execute(
            "UPDATE content_templates SET last_generated_at = ?1
             WHERE id = ?2 AND last_generated_at IS ?3",
            params![
                Self::format_datetime(&at),
                id,
                previous.as_ref().map(Self::format_datetime),
            ],
        )?;
        if changed > 0 {
            return Ok(true);
        }
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM content_templates WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::NotFound(format!("template {}", id)));
        }
        Ok(false)
    }

    fn insert_content_row(
        conn: &Connection,
        content: &NewGeneratedContent,
    ) -> StoreResult<GeneratedContent> {
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO generated_content
                (template_id, title, body, content_type, status, views, clicks, conversions,
                 created_at, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 0, ?6, NULL)",
            params![
                content.template_id,
                content.title,
                content.body,
                content.content_type,
                ContentStatus::Draft.as_str(),
                Self::format_datetime(&created_at),
            ],
        )
        .map_err(|e| StoreError::from_insert(e, format!("content '{}'", content.title)))?;

        Ok(GeneratedContent {
            id: conn.last_insert_rowid(),
            template_id: content.template_id,
            title: content.title.clone(),
            body: content.body.clone(),
            content_type: content.content_type.clone(),
            status: ContentStatus::Draft,
            metrics: PerformanceMetrics::default(),
            created_at,
            published_at: None,
        })
    }

    fn ensure_updated(changed: usize, what: impl FnOnce() -> String) -> StoreResult<()> {
        if changed == 0 {
            return Err(StoreError::NotFound(what()));
        }
        Ok(())
    }
}

impl ContentStore for SqliteContentStore {
    fn get_or_create_category(&self, slug: &str, name: &str) -> StoreResult<Category> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO categories (slug, name) VALUES (?1, ?2)",
            params![slug, name],
        )?;
        let category = conn.query_row(
            "SELECT id, slug, name FROM categories WHERE slug = ?1",
            params![slug],
            Self::row_to_category,
        )?;
        Ok(category)
    }

    fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, slug, name FROM categories ORDER BY id")?;
        let categories = stmt
            .query_map([], Self::row_to_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    fn tool_exists_by_slug(&self, slug: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        Self::exists(&conn, "SELECT 1 FROM tools WHERE slug = ?1", &slug)
    }

    fn insert_tool(&self, tool: &NewTool) -> StoreResult<Tool> {
        let created_at = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tools
                (slug, name, category_id, description, website_url, pricing, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                tool.slug,
                tool.name,
                tool.category_id,
                tool.description,
                tool.website_url,
                tool.pricing,
                Self::format_datetime(&created_at),
            ],
        )
        .map_err(|e| StoreError::from_insert(e, format!("tool '{}'", tool.slug)))?;

        Ok(Tool {
            id: conn.last_insert_rowid(),
            slug: tool.slug.clone(),
            name: tool.name.clone(),
            category_id: tool.category_id,
            description: tool.description.clone(),
            website_url: tool.website_url.clone(),
            pricing: tool.pricing.clone(),
            created_at,
        })
    }

    fn tools_without_review(&self, category_id: i64, limit: usize) -> StoreResult<Vec<Tool>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tools t
             WHERE t.category_id = ?1
               AND NOT EXISTS (SELECT 1 FROM reviews r WHERE r.tool_id = t.id)
             ORDER BY t.id
             LIMIT ?2",
            TOOL_COLUMNS
        ))?;
        let tools = stmt
            .query_map(params![category_id, limit as i64], Self::row_to_tool)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tools)
    }

    fn review_exists(&self, tool_id: i64) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        Self::exists(&conn, "SELECT 1 FROM reviews WHERE tool_id = ?1", &tool_id)
    }

    fn insert_review(&self, review: &NewReview) -> StoreResult<Review> {
        let created_at = Utc::now();
        let pros = serde_json::to_string(&review.pros)?;
        let cons = serde_json::to_string(&review.cons)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO reviews (tool_id, rating, summary, pros, cons, verdict, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                review.tool_id,
                review.rating,
                review.summary,
                pros,
                cons,
                review.verdict,
                Self::format_datetime(&created_at),
            ],
        )
        .map_err(|e| StoreError::from_insert(e, format!("review for tool {}", review.tool_id)))?;

        Ok(Review {
            id: conn.last_insert_rowid(),
            tool_id: review.tool_id,
            rating: review.rating,
            summary: review.summary.clone(),
            pros: review.pros.clone(),
            cons: review.cons.clone(),
            verdict: review.verdict.clone(),
            created_at,
        })
    }

    fn get_review_for_tool(&self, tool_id: i64) -> StoreResult<Option<Review>> {
        let conn = self.conn.lock().unwrap();
        let review = conn
            .query_row(
                "SELECT id, tool_id, rating, summary, pros, cons, verdict, created_at
                 FROM reviews WHERE tool_id = ?1",
                params![tool_id],
                Self::row_to_review,
            )
            .optional()?;
        Ok(review)
    }

    fn insert_template(&self, template: &NewContentTemplate) -> StoreResult<ContentTemplate> {
        let keywords = serde_json::to_string(&template.keywords)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO content_templates
                (name, content_type, body, keywords, frequency_days, active, last_generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            params![
                template.name,
                template.content_type,
                template.body,
                keywords,
                template.frequency_days as i64,
                template.active as i64,
            ],
        )
        .map_err(|e| StoreError::from_insert(e, format!("template '{}'", template.name)))?;

        Ok(ContentTemplate {
            id: conn.last_insert_rowid(),
            name: template.name.clone(),
            content_type: template.content_type.clone(),
            body: template.body.clone(),
            keywords: template.keywords.clone(),
            frequency_days: template.frequency_days,
            active: template.active,
            last_generated_at: None,
        })
    }

    fn get_template(&self, id: i64) -> StoreResult<Option<ContentTemplate>> {
        let conn = self.conn.lock().unwrap();
        let template = conn
            .query_row(
                &format!(
                    "SELECT {} FROM content_templates WHERE id = ?1",
                    TEMPLATE_COLUMNS
                ),
                params![id],
                Self::row_to_template,
            )
            .optional()?;
        Ok(template)
    }

    fn due_templates(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<ContentTemplate>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM content_templates
             WHERE active = 1
             ORDER BY last_generated_at IS NOT NULL, last_generated_at, id",
            TEMPLATE_COLUMNS
        ))?;
        // The frequency window is per row, so the gate runs on the parsed
        // timestamps rather than in SQL.
        let templates = stmt
            .query_map([], Self::row_to_template)?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .filter(|t| t.is_due(now))
            .take(limit)
            .collect();
        Ok(templates)
    }

    fn mark_template_generated(
        &self,
        id: i64,
        previous: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        Self::compare_and_mark(&conn, id, previous, at)
    }

    fn insert_generated_content(
        &self,
        content: &NewGeneratedContent,
    ) -> StoreResult<GeneratedContent> {
        let conn = self.conn.lock().unwrap();
        Self::insert_content_row(&conn, content)
    }

    fn insert_generated_content_for(
        &self,
        template: &ContentTemplate,
        content: &NewGeneratedContent,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<GeneratedContent>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        if !Self::compare_and_mark(&tx, template.id, template.last_generated_at, at)? {
            return Ok(None);
        }
        let created = Self::insert_content_row(&tx, content)?;
        tx.commit()?;
        Ok(Some(created))
    }

    fn get_content(&self, id: i64) -> StoreResult<Option<GeneratedContent>> {
        let conn = self.conn.lock().unwrap();
        let content = conn
            .query_row(
                &format!(
                    "SELECT {} FROM generated_content WHERE id = ?1",
                    CONTENT_COLUMNS
                ),
                params![id],
                Self::row_to_content,
            )
            .optional()?;
        Ok(content)
    }

    fn publish_content(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE generated_content SET status = ?1, published_at = ?2 WHERE id = ?3",
            params![
                ContentStatus::Published.as_str(),
                Self::format_datetime(&at),
                id
            ],
        )?;
        Self::ensure_updated(changed, || format!("content {}", id))
    }

    fn record_content_metrics(&self, id: i64, metrics: &PerformanceMetrics) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE generated_content SET views = ?1, clicks = ?2, conversions = ?3
             WHERE id = ?4",
            params![metrics.views, metrics.clicks, metrics.conversions, id],
        )?;
        Self::ensure_updated(changed, || format!("content {}", id))
    }

    fn content_without_optimization(&self, limit: usize) -> StoreResult<Vec<GeneratedContent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM generated_content c
             WHERE c.status = ?1
               AND NOT EXISTS (SELECT 1 FROM seo_optimizations o WHERE o.content_id = c.id)
             ORDER BY c.published_at, c.id
             LIMIT ?2",
            CONTENT_COLUMNS
        ))?;
        let contents = stmt
            .query_map(
                params![ContentStatus::Published.as_str(), limit as i64],
                Self::row_to_content,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(contents)
    }

    fn optimization_exists(&self, content_id: i64) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        Self::exists(
            &conn,
            "SELECT 1 FROM seo_optimizations WHERE content_id = ?1",
            &content_id,
        )
    }

    fn insert_optimization(
        &self,
        optimization: &NewSeoOptimization,
    ) -> StoreResult<SeoOptimization> {
        let created_at = Utc::now();
        let keywords = serde_json::to_string(&optimization.keywords)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO seo_optimizations
                (content_id, title, meta_description, keywords, h1, status,
                 baseline_views, baseline_clicks, baseline_conversions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                optimization.content_id,
                optimization.title,
                optimization.meta_description,
                keywords,
                optimization.h1,
                OptimizationStatus::Pending.as_str(),
                optimization.baseline.views,
                optimization.baseline.clicks,
                optimization.baseline.conversions,
                Self::format_datetime(&created_at),
            ],
        )
        .map_err(|e| {
            StoreError::from_insert(
                e,
                format!("optimization for content {}", optimization.content_id),
            )
        })?;

        Ok(SeoOptimization {
            id: conn.last_insert_rowid(),
            content_id: optimization.content_id,
            title: optimization.title.clone(),
            meta_description: optimization.meta_description.clone(),
            keywords: optimization.keywords.clone(),
            h1: optimization.h1.clone(),
            status: OptimizationStatus::Pending,
            baseline: optimization.baseline,
            created_at,
        })
    }

    fn get_optimization_for_content(
        &self,
        content_id: i64,
    ) -> StoreResult<Option<SeoOptimization>> {
        let conn = self.conn.lock().unwrap();
        let optimization = conn
            .query_row(
                &format!(
                    "SELECT {} FROM seo_optimizations WHERE content_id = ?1",
                    OPTIMIZATION_COLUMNS
                ),
                params![content_id],
                Self::row_to_optimization,
            )
            .optional()?;
        Ok(optimization)
    }

    fn counts(&self) -> StoreResult<ContentCounts> {
        let conn = self.conn.lock().unwrap();
        Ok(ContentCounts {
            categories: Self::count(&conn, "categories")?,
            tools: Self::count(&conn, "tools")?,
            reviews: Self::count(&conn, "reviews")?,
            templates: Self::count(&conn, "content_templates")?,
            generated_content: Self::count(&conn, "generated_content")?,
            optimizations: Self::count(&conn, "seo_optimizations")?,
        })
    }
}
