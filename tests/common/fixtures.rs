//! Fake generator used in place of a real model endpoint.

use async_trait::async_trait;
use content_autopilot::llm::{GenerationError, GenerationRequest, TextGenerator};
use std::sync::atomic::{AtomicUsize, Ordering};

type Responder = dyn Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync;

/// Answers each request with whatever `responder` returns and counts calls.
pub struct FakeGenerator {
    responder: Box<Responder>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
        }
    }

    /// Picks a canned reply per pipeline from the prompt wording.
    pub fn by_pipeline(
        catalog: &'static str,
        review: &'static str,
        content: &'static str,
        seo: &'static str,
    ) -> Self {
        Self::new(move |request| {
            let prompt = request.prompt.as_str();
            let reply = if prompt.starts_with("List ") {
                catalog
            } else if prompt.starts_with("Write a review") {
                review
            } else if prompt.starts_with("Suggest SEO") {
                seo
            } else {
                content
            };
            Ok(reply.to_string())
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(request)
    }
}
