//! Content generation: drafts a piece of content for every due template.

use crate::automation::clock::Clock;
use crate::automation::context::PipelineContext;
use crate::automation::error::{ItemError, PipelineError};
use crate::automation::pipeline::Pipeline;
use crate::automation::runner::{execute_batch, AggregateResult, ItemOutcome};
use crate::automation_store::{PipelineId, PipelineSettings};
use crate::content_store::{ContentTemplate, NewGeneratedContent};
use crate::llm::{parse_structured, ParsedOutput};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

const SYSTEM_INSTRUCTION: &str = "You are a content writer for an AI tools website. \
    Reply with a JSON object containing \"title\" and \"body\" (markdown).";

#[derive(Debug, Deserialize)]
struct ContentPayload {
    title: String,
    body: String,
}

pub struct ContentGenerationPipeline;

impl ContentGenerationPipeline {
    fn prompt(template: &ContentTemplate) -> String {
        let mut prompt = template.body.trim().to_string();
        if !template.keywords.is_empty() {
            prompt.push_str("\n\nTarget keywords: ");
            prompt.push_str(&template.keywords.join(", "));
        }
        prompt
    }

    /// Falls back to the raw reply as the body when it is not structured.
    fn to_content(
        template: &ContentTemplate,
        reply: &str,
    ) -> Result<NewGeneratedContent, ItemError> {
        let (title, body) = match parse_structured::<ContentPayload>(reply) {
            ParsedOutput::Structured(payload) | ParsedOutput::ExtractedFallback(payload) => {
                (payload.title, payload.body)
            }
            ParsedOutput::Unparseable(_) => (template.name.clone(), reply.to_string()),
        };

        let body = body.trim().to_string();
        if body.is_empty() {
            return Err(ItemError::Invalid("generated body is empty".to_string()));
        }
        let title = match title.trim() {
            "" => template.name.clone(),
            t => t.to_string(),
        };

        Ok(NewGeneratedContent {
            template_id: Some(template.id),
            title,
            body,
            content_type: template.content_type.clone(),
        })
    }

    async fn generate_for_template(
        ctx: &PipelineContext,
        template: ContentTemplate,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, ItemError> {
        // Another run may have handled the template since it was selected.
        let current = ctx
            .content_store
            .get_template(template.id)?
            .filter(|t| t.is_due(now));
        let Some(template) = current else {
            debug!(template_id = template.id, "Template no longer due");
            return Ok(ItemOutcome::Skipped);
        };

        let reply = ctx
            .generate(Self::prompt(&template), SYSTEM_INSTRUCTION)
            .await?;
        let content = Self::to_content(&template, &reply)?;

        match ctx
            .content_store
            .insert_generated_content_for(&template, &content, now)?
        {
            Some(_) => Ok(ItemOutcome::Added),
            None => {
                debug!(template_id = template.id, "Template generated by another run");
                Ok(ItemOutcome::Skipped)
            }
        }
    }
}

#[async_trait]
impl Pipeline for ContentGenerationPipeline {
    fn id(&self) -> PipelineId {
        PipelineId::ContentGeneration
    }

    fn name(&self) -> &'static str {
        "Content Generation"
    }

    fn description(&self) -> &'static str {
        "Drafts content from templates whose frequency window has elapsed"
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        settings: &PipelineSettings,
    ) -> Result<AggregateResult, PipelineError> {
        let limit = settings.batch_params.content_generation().templates_per_run;
        let now = ctx.clock.now();

        // Templates inside their frequency window are never selected, so they
        // do not show up in the skipped count.
        let templates = ctx.content_store.due_templates(now, limit)?;
        info!(templates = templates.len(), "Generating content");

        execute_batch(self.id(), templates, limit, move |template| {
            Self::generate_for_template(ctx, template, now)
        })
        .await
    }
}
