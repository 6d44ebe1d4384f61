//! SEO optimization: suggests search metadata for published content.

use crate::automation::context::PipelineContext;
use crate::automation::error::{ItemError, PipelineError};
use crate::automation::pipeline::Pipeline;
use crate::automation::runner::{execute_batch, AggregateResult, ItemOutcome};
use crate::automation_store::{PipelineId, PipelineSettings};
use crate::content_store::{GeneratedContent, NewSeoOptimization, StoreError};
use crate::llm::{parse_structured, ParsedOutput};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

const SYSTEM_INSTRUCTION: &str = "You are an SEO specialist. Reply with a single JSON object only.";

/// Characters of the body included in the prompt.
const BODY_EXCERPT_CHARS: usize = 1500;

#[derive(Debug, Deserialize)]
struct SeoPayload {
    title: String,
    #[serde(default, alias = "metaDescription")]
    meta_description: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    h1: String,
}

pub struct SeoOptimizationPipeline;

impl SeoOptimizationPipeline {
    fn prompt(content: &GeneratedContent) -> String {
        let excerpt: String = content.body.chars().take(BODY_EXCERPT_CHARS).collect();
        format!(
            "Suggest SEO improvements for this {} titled \"{}\".\n\n{}\n\n\
             Return an object with \"title\" (max 60 characters), \"meta_description\" \
             (max 160 characters), \"keywords\" (array of strings) and \"h1\".",
            content.content_type, content.title, excerpt
        )
    }

    async fn optimize(
        ctx: &PipelineContext,
        content: GeneratedContent,
    ) -> Result<ItemOutcome, ItemError> {
        if ctx.content_store.optimization_exists(content.id)? {
            debug!(content_id = content.id, "Content already optimized");
            return Ok(ItemOutcome::Skipped);
        }

        let reply = ctx
            .generate(Self::prompt(&content), SYSTEM_INSTRUCTION)
            .await?;
        let payload = match parse_structured::<SeoPayload>(&reply) {
            ParsedOutput::Structured(payload) | ParsedOutput::ExtractedFallback(payload) => payload,
            ParsedOutput::Unparseable(reason) => return Err(ItemError::Unparseable(reason)),
        };

        let title = payload.title.trim().to_string();
        if title.is_empty() {
            return Err(ItemError::Invalid("suggested title is empty".to_string()));
        }
        let h1 = match payload.h1.trim() {
            "" => title.clone(),
            h1 => h1.to_string(),
        };

        let optimization = NewSeoOptimization {
            content_id: content.id,
            title,
            meta_description: payload.meta_description.trim().to_string(),
            keywords: payload
                .keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            h1,
            baseline: content.metrics,
        };
        match ctx.content_store.insert_optimization(&optimization) {
            Ok(_) => Ok(ItemOutcome::Added),
            Err(StoreError::Duplicate(_)) => Ok(ItemOutcome::Skipped),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Pipeline for SeoOptimizationPipeline {
    fn id(&self) -> PipelineId {
        PipelineId::SeoOptimization
    }

    fn name(&self) -> &'static str {
        "SEO Optimization"
    }

    fn description(&self) -> &'static str {
        "Suggests search metadata for published content"
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        settings: &PipelineSettings,
    ) -> Result<AggregateResult, PipelineError> {
        let limit = settings.batch_params.seo_optimization().contents_per_run;
        let contents = ctx.content_store.content_without_optimization(limit)?;
        info!(contents = contents.len(), "Optimizing content");

        execute_batch(self.id(), contents, limit, move |content| {
            Self::optimize(ctx, content)
        })
        .await
    }
}
