use super::clock::Clock;
use super::error::ItemError;
use crate::content_store::ContentStore;
use crate::llm::{GenerationRequest, TextGenerator};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Model parameters applied to every generation request a pipeline makes.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Transport-level timeout passed to the generator.
    pub request_timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: Some(2048),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Shared resources handed to pipelines during execution.
#[derive(Clone)]
pub struct PipelineContext {
    pub content_store: Arc<dyn ContentStore>,
    pub generator: Arc<dyn TextGenerator>,
    pub clock: Arc<dyn Clock>,
    pub generation: GenerationSettings,
    /// Upper bound on a single generation call, enforced around the generator.
    pub item_timeout: Duration,
}

impl PipelineContext {
    pub fn new(
        content_store: Arc<dyn ContentStore>,
        generator: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
        generation: GenerationSettings,
        item_timeout: Duration,
    ) -> Self {
        Self {
            content_store,
            generator,
            clock,
            generation,
            item_timeout,
        }
    }

    /// Sends one prompt to the generator. An expired `item_timeout` is an
    /// [`ItemError::Timeout`] like any other item failure.
    pub async fn generate(
        &self,
        prompt: String,
        system_instruction: &str,
    ) -> Result<String, ItemError> {
        let request = GenerationRequest {
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
            timeout: self.generation.request_timeout,
            ..GenerationRequest::new(prompt, self.generation.model.as_str())
                .with_system_instruction(system_instruction)
        };

        debug!(
            generator = self.generator.name(),
            model = %request.model,
            "Requesting generation"
        );

        match tokio::time::timeout(self.item_timeout, self.generator.generate(&request)).await {
            Ok(result) => result.map_err(ItemError::from),
            Err(_) => Err(ItemError::Timeout(self.item_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::pipeline::Pipeline;
    use crate::automation::pipelines::test_support::fixture;
    use crate::automation::pipelines::ContentGenerationPipeline;
    use crate::automation_store::{PipelineId, PipelineSettings};
    use crate::content_store::NewContentTemplate;
    use crate::llm::GenerationError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers immediately unless the prompt mentions "slow", in which case
    /// it sleeps far past any item timeout.
    struct SleepyGenerator {
        requests: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl TextGenerator for SleepyGenerator {
        fn name(&self) -> &str {
            "sleepy"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            self.requests.lock().unwrap().push(request.clone());
            if request.prompt.contains("slow") {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(r#"{"title": "Done", "body": "Finished in time"}"#.to_string())
        }
    }

    fn template(name: &str) -> NewContentTemplate {
        NewContentTemplate {
            name: name.to_string(),
            content_type: "blog_post".to_string(),
            body: format!("Write the {} one", name),
            keywords: vec![],
            frequency_days: 7,
            active: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_generation_times_out_and_batch_continues() {
        let f = fixture(vec![]);
        f.store.insert_template(&template("slow")).unwrap();
        let quick = f.store.insert_template(&template("quick")).unwrap();
        let generator = Arc::new(SleepyGenerator {
            requests: Mutex::new(Vec::new()),
        });
        let ctx = PipelineContext {
            generator: Arc::clone(&generator) as Arc<dyn TextGenerator>,
            ..f.ctx.clone()
        };

        let result = ContentGenerationPipeline
            .run(
                &ctx,
                &PipelineSettings::defaults(PipelineId::ContentGeneration),
            )
            .await
            .unwrap();

        assert_eq!(result.counts(), (1, 0, 1));
        assert!(result.error_samples[0].contains("timed out after 5s"));
        assert_eq!(generator.requests.lock().unwrap().len(), 2);
        assert!(f
            .store
            .get_template(quick.id)
            .unwrap()
            .unwrap()
            .last_generated_at
            .is_some());
    }

    #[tokio::test]
    async fn test_requests_carry_generation_settings() {
        let f = fixture(vec![]);
        let generator = Arc::new(SleepyGenerator {
            requests: Mutex::new(Vec::new()),
        });
        let ctx = PipelineContext {
            generator: Arc::clone(&generator) as Arc<dyn TextGenerator>,
            generation: GenerationSettings {
                model: "local-model".to_string(),
                temperature: 0.2,
                max_tokens: None,
                request_timeout: Duration::from_secs(30),
            },
            ..f.ctx.clone()
        };

        ctx.generate("Summarize".to_string(), "Be brief").await.unwrap();

        let requests = generator.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.prompt, "Summarize");
        assert_eq!(request.system_instruction.as_deref(), Some("Be brief"));
        assert_eq!(request.model, "local-model");
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, None);
        assert_eq!(request.timeout, Duration::from_secs(30));
    }
}
