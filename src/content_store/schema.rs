//! SQLite schema for the content database.
//!
//! Every natural key the pipelines dedup on carries a UNIQUE constraint, so a
//! lost check-then-insert race fails the insert instead of duplicating a row.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

const CATEGORIES_TABLE_V1: Table = Table {
    name: "categories",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("slug", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["slug"]],
};

const TOOLS_TABLE_V1: Table = Table {
    name: "tools",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("slug", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("category_id", &SqlType::Integer, non_null = true),
        sqlite_column!("description", &SqlType::Text, non_null = true),
        sqlite_column!("website_url", &SqlType::Text),
        sqlite_column!("pricing", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_tools_category", "category_id")],
    unique_constraints: &[&["slug"]],
};

const REVIEWS_TABLE_V1: Table = Table {
    name: "reviews",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("tool_id", &SqlType::Integer, non_null = true),
        sqlite_column!("rating", &SqlType::Real, non_null = true),
        sqlite_column!("summary", &SqlType::Text, non_null = true),
        sqlite_column!("pros", &SqlType::Text, non_null = true),
        sqlite_column!("cons", &SqlType::Text, non_null = true),
        sqlite_column!("verdict", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["tool_id"]],
};

const CONTENT_TEMPLATES_TABLE_V1: Table = Table {
    name: "content_templates",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("content_type", &SqlType::Text, non_null = true),
        sqlite_column!("body", &SqlType::Text, non_null = true),
        sqlite_column!("keywords", &SqlType::Text, non_null = true),
        sqlite_column!("frequency_days", &SqlType::Integer, non_null = true),
        sqlite_column!("active", &SqlType::Integer, non_null = true),
        sqlite_column!("last_generated_at", &SqlType::Text),
    ],
    indices: &[("idx_content_templates_active", "active")],
    unique_constraints: &[],
};

const GENERATED_CONTENT_TABLE_V1: Table = Table {
    name: "generated_content",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("template_id", &SqlType::Integer),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("body", &SqlType::Text, non_null = true),
        sqlite_column!("content_type", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("views", &SqlType::Integer, non_null = true),
        sqlite_column!("clicks", &SqlType::Integer, non_null = true),
        sqlite_column!("conversions", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("published_at", &SqlType::Text),
    ],
    indices: &[("idx_generated_content_status", "status")],
    unique_constraints: &[],
};

const SEO_OPTIMIZATIONS_TABLE_V1: Table = Table {
    name: "seo_optimizations",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("content_id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("meta_description", &SqlType::Text, non_null = true),
        sqlite_column!("keywords", &SqlType::Text, non_null = true),
        sqlite_column!("h1", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("baseline_views", &SqlType::Integer, non_null = true),
        sqlite_column!("baseline_clicks", &SqlType::Integer, non_null = true),
        sqlite_column!("baseline_conversions", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["content_id"]],
};

pub const CONTENT_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        CATEGORIES_TABLE_V1,
        TOOLS_TABLE_V1,
        REVIEWS_TABLE_V1,
        CONTENT_TEMPLATES_TABLE_V1,
        GENERATED_CONTENT_TABLE_V1,
        SEO_OPTIMIZATIONS_TABLE_V1,
    ],
    migration: None,
}];
