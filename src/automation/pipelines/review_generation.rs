//! Review generation: writes one review for catalog tools that have none,
//! sampling a few categories per run.

use crate::automation::context::PipelineContext;
use crate::automation::error::{ItemError, PipelineError};
use crate::automation::pipeline::Pipeline;
use crate::automation::runner::{execute_batch, AggregateResult, ItemOutcome};
use crate::automation_store::{CategorySelection, PipelineId, PipelineSettings};
use crate::content_store::{Category, NewReview, StoreError, Tool};
use crate::llm::{parse_structured, ParsedOutput};
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use serde::Deserialize;
use tracing::{debug, info};

const SYSTEM_INSTRUCTION: &str = "You are an impartial software reviewer. \
    Reply with a single JSON object only.";

#[derive(Debug, Deserialize)]
struct ReviewPayload {
    rating: f64,
    summary: String,
    #[serde(default)]
    pros: Vec<String>,
    #[serde(default)]
    cons: Vec<String>,
    verdict: String,
}

impl ReviewPayload {
    fn validate(self, tool_id: i64) -> Result<NewReview, ItemError> {
        if !(1.0..=5.0).contains(&self.rating) {
            return Err(ItemError::Invalid(format!(
                "rating {} outside 1..=5",
                self.rating
            )));
        }
        if self.summary.trim().is_empty() || self.verdict.trim().is_empty() {
            return Err(ItemError::Invalid(
                "review is missing summary or verdict".to_string(),
            ));
        }
        Ok(NewReview {
            tool_id,
            rating: self.rating,
            summary: self.summary.trim().to_string(),
            pros: self.pros,
            cons: self.cons,
            verdict: self.verdict.trim().to_string(),
        })
    }
}

pub struct ReviewGenerationPipeline;

impl ReviewGenerationPipeline {
    fn sample_categories(
        categories: Vec<Category>,
        selection: CategorySelection,
    ) -> Vec<Category> {
        match selection {
            CategorySelection::All(_) => categories,
            CategorySelection::Count(count) if count >= categories.len() => categories,
            CategorySelection::Count(count) => {
                let mut rng = rand::rng();
                categories
                    .choose_multiple(&mut rng, count)
                    .cloned()
                    .collect()
            }
        }
    }

    fn prompt(category: &Category, tool: &Tool) -> String {
        let mut prompt = format!(
            "Write a review of the AI tool \"{}\" (category: {}).\n",
            tool.name, category.name
        );
        if !tool.description.is_empty() {
            prompt.push_str(&format!("Description: {}\n", tool.description));
        }
        if let Some(pricing) = &tool.pricing {
            prompt.push_str(&format!("Pricing: {}\n", pricing));
        }
        prompt.push_str(
            "Return an object with \"rating\" (number from 1 to 5), \"summary\", \
             \"pros\" (array of strings), \"cons\" (array of strings) and \"verdict\".",
        );
        prompt
    }

    async fn review_tool(
        ctx: &PipelineContext,
        category: Category,
        tool: Tool,
    ) -> Result<ItemOutcome, ItemError> {
        if ctx.content_store.review_exists(tool.id)? {
            debug!(tool = %tool.slug, "Tool already reviewed");
            return Ok(ItemOutcome::Skipped);
        }

        let reply = ctx
            .generate(Self::prompt(&category, &tool), SYSTEM_INSTRUCTION)
            .await?;
        let payload = match parse_structured::<ReviewPayload>(&reply) {
            ParsedOutput::Structured(payload) | ParsedOutput::ExtractedFallback(payload) => payload,
            ParsedOutput::Unparseable(reason) => return Err(ItemError::Unparseable(reason)),
        };
        let review = payload.validate(tool.id)?;

        match ctx.content_store.insert_review(&review) {
            Ok(_) => Ok(ItemOutcome::Added),
            Err(StoreError::Duplicate(_)) => Ok(ItemOutcome::Skipped),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Pipeline for ReviewGenerationPipeline {
    fn id(&self) -> PipelineId {
        PipelineId::ReviewGeneration
    }

    fn name(&self) -> &'static str {
        "Review Generation"
    }

    fn description(&self) -> &'static str {
        "Writes reviews for catalog tools that have none"
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        settings: &PipelineSettings,
    ) -> Result<AggregateResult, PipelineError> {
        let params = settings.batch_params.review_generation();
        let categories = ctx.content_store.list_categories()?;
        let sampled = Self::sample_categories(categories, params.categories_per_run);

        let mut items = Vec::new();
        for category in sampled {
            let tools = ctx
                .content_store
                .tools_without_review(category.id, params.tools_per_category)?;
            items.extend(tools.into_iter().map(|tool| (category.clone(), tool)));
        }
        info!(items = items.len(), "Generating reviews");

        let limit = items.len();
        execute_batch(self.id(), items, limit, move |(category, tool)| {
            Self::review_tool(ctx, category, tool)
        })
        .await
    }
}
