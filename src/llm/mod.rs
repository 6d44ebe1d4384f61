//! Generative text capability.
//!
//! Pipelines talk to a [`TextGenerator`]; the binary wires in
//! [`OpenAiGenerator`] from configuration.

mod extract;
mod openai;
mod provider;

pub use extract::{parse_structured, ParsedOutput};
pub use openai::{ApiKeySource, OpenAiGenerator};
pub use provider::{GenerationError, GenerationRequest, TextGenerator};
