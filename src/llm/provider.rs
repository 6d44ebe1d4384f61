//! Text generation trait definition.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A single prompt sent to a [`TextGenerator`].
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub model: String,
    /// Sampling temperature (0.0 = deterministic).
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Per-request timeout handed to the transport.
    pub timeout: Duration,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

/// Errors that can occur when asking a generator for text.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// No usable credentials or endpoint. Retrying will not help.
    #[error("Generator not configured: {0}")]
    NotConfigured(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Request timeout")]
    Timeout,
}

impl GenerationError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, GenerationError::NotConfigured(_))
    }
}

/// External generative capability: turns a prompt into text or fails.
///
/// Implementations do not retry; callers decide what a failure means.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name for logs (e.g. "openai").
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}
