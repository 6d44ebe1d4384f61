//! Shared constants for the integration tests
//!
//! When canned replies or fixture data change, update only this file.

/// Catalog reply with two new tools and one duplicate name.
pub const CATALOG_REPLY: &str = r#"Sure! Here are some tools:
[
    {"name": "Quill Writer", "category": "Writing", "description": "Drafts essays"},
    {"name": "Echo Voice", "category": "Audio", "website_url": "https://echo.example"},
    {"name": "quill writer", "category": "Writing"}
]"#;

pub const REVIEW_REPLY: &str = r#"{"rating": 4, "summary": "Solid", "pros": ["fast"],
    "cons": ["pricey"], "verdict": "Recommended"}"#;

pub const CONTENT_REPLY: &str = r#"{"title": "Top AI Writing Tools", "body": "A short roundup."}"#;

pub const SEO_REPLY: &str = r#"{"title": "Best AI Writing Tools", "meta_description": "Compared",
    "keywords": ["ai", "writing"], "h1": "AI Writing Tools"}"#;

/// Body of the content template seeded by [`super::TestEnv::add_template`].
pub const TEMPLATE_BODY: &str = "Write a weekly roundup of AI tools";
