//! Catalog sync: asks the generator for new catalog entries and stores the
//! ones whose slug is not in the catalog yet.

use crate::automation::context::PipelineContext;
use crate::automation::error::{ItemError, PipelineError};
use crate::automation::pipeline::Pipeline;
use crate::automation::runner::{execute_batch, AggregateResult, ItemOutcome};
use crate::automation_store::{PipelineId, PipelineSettings};
use crate::content_store::{NewTool, StoreError};
use crate::llm::{parse_structured, ParsedOutput};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

const SYSTEM_INSTRUCTION: &str = "You maintain a directory of AI software tools. \
    Reply with a JSON array only, no commentary.";

const UNCATEGORIZED: &str = "Uncategorized";

lazy_static! {
    static ref NON_ALPHANUMERIC_RUN: Regex =
        Regex::new(r"[^a-z0-9]+").expect("valid slug regex");
}

/// Lower-cases `name` and collapses every run of non-alphanumeric characters
/// into one hyphen, trimming hyphens at both ends.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    NON_ALPHANUMERIC_RUN
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "url", alias = "website")]
    website_url: Option<String>,
    #[serde(default)]
    pricing: Option<String>,
}

impl CatalogEntry {
    /// Reads one element of the generated array. A malformed element fails
    /// only its own item.
    fn from_value(raw: Value) -> Result<Self, ItemError> {
        serde_json::from_value(raw)
            .map_err(|e| ItemError::Invalid(format!("catalog entry: {}", e)))
    }
}

fn builtin_entry(name: &str, category: &str, description: &str, url: &str, pricing: &str) -> Value {
    json!({
        "name": name,
        "category": category,
        "description": description,
        "website_url": url,
        "pricing": pricing,
    })
}

/// Built-in entries used when no array can be read from the generator's reply.
fn fixture_entries() -> Vec<Value> {
    vec![
        builtin_entry(
            "ChatGPT",
            "Chatbots",
            "Conversational assistant for writing, coding and research.",
            "https://chat.openai.com",
            "freemium",
        ),
        builtin_entry(
            "Midjourney",
            "Image Generation",
            "Text-to-image model producing artistic renders.",
            "https://www.midjourney.com",
            "paid",
        ),
        builtin_entry(
            "GitHub Copilot",
            "Coding",
            "Code completion inside the editor.",
            "https://github.com/features/copilot",
            "paid",
        ),
        builtin_entry(
            "ElevenLabs",
            "Audio",
            "Realistic text-to-speech and voice cloning.",
            "https://elevenlabs.io",
            "freemium",
        ),
        builtin_entry(
            "Notion AI",
            "Productivity",
            "Writing and summarization built into Notion.",
            "https://www.notion.so/product/ai",
            "paid",
        ),
    ]
}

pub struct CatalogSyncPipeline;

impl CatalogSyncPipeline {
    fn prompt(count: usize) -> String {
        format!(
            "List {count} popular AI tools. For each give an object with the fields \
             \"name\", \"category\", \"description\" (one sentence), \"website_url\" and \
             \"pricing\" (free, freemium or paid). Return a JSON array of {count} objects."
        )
    }

    async fn store_entry(ctx: &PipelineContext, raw: Value) -> Result<ItemOutcome, ItemError> {
        let entry = CatalogEntry::from_value(raw)?;
        let name = entry.name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(ItemError::Invalid(format!(
                "entry name {:?} has no usable characters",
                entry.name
            )));
        }

        let store = &ctx.content_store;
        if store.tool_exists_by_slug(&slug)? {
            debug!(slug = %slug, "Catalog entry already exists");
            return Ok(ItemOutcome::Skipped);
        }

        let category_name = entry
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && !slugify(c).is_empty())
            .unwrap_or(UNCATEGORIZED);
        let category = store.get_or_create_category(&slugify(category_name), category_name)?;

        let tool = NewTool {
            slug,
            name: name.to_string(),
            category_id: category.id,
            description: entry.description.unwrap_or_default().trim().to_string(),
            website_url: entry.website_url.filter(|u| !u.trim().is_empty()),
            pricing: entry.pricing.filter(|p| !p.trim().is_empty()),
        };
        match store.insert_tool(&tool) {
            Ok(_) => Ok(ItemOutcome::Added),
            Err(StoreError::Duplicate(_)) => Ok(ItemOutcome::Skipped),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Pipeline for CatalogSyncPipeline {
    fn id(&self) -> PipelineId {
        PipelineId::CatalogSync
    }

    fn name(&self) -> &'static str {
        "Catalog Sync"
    }

    fn description(&self) -> &'static str {
        "Adds new AI tools to the catalog"
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        settings: &PipelineSettings,
    ) -> Result<AggregateResult, PipelineError> {
        let limit = settings.batch_params.catalog_sync().entries_per_run;
        if limit == 0 {
            return Ok(AggregateResult::default());
        }

        // One request for the whole batch; its failure fails the run.
        let reply = ctx
            .generate(Self::prompt(limit), SYSTEM_INSTRUCTION)
            .await
            .map_err(PipelineError::from)?;

        let (entries, degraded) = match parse_structured::<Vec<Value>>(&reply) {
            ParsedOutput::Structured(entries) => (entries, false),
            ParsedOutput::ExtractedFallback(entries) => {
                debug!("Catalog entries recovered from surrounding text");
                (entries, false)
            }
            ParsedOutput::Unparseable(reason) => {
                warn!(reason = %reason, "Catalog reply unparseable, using built-in entries");
                (fixture_entries(), true)
            }
        };
        info!(entries = entries.len(), degraded, "Syncing catalog entries");

        let mut result = execute_batch(self.id(), entries, limit, move |entry| {
            Self::store_entry(ctx, entry)
        })
        .await?;
        result.degraded = degraded;
        Ok(result)
    }
}
