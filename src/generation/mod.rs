//! Language-generation capability
//!
//! The orchestrator and agents are written against [`Capability`] only.
//! Whether a real backend is wired in is decided once, by
//! [`create_capability`], at startup.

use crate::config::{GenerationBackend, GenerationConfig};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod gemini;
pub mod mock;
pub mod openai;

pub use gemini::GeminiClient;
pub use mock::MockLanguageModel;
pub use openai::OpenAiChatClient;

/// Trait for text generation backends
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Generate text for `prompt`, grounded on `context` passages.
    /// Provider failures surface as `GenerationError`.
    async fn generate(&self, prompt: &str, context: &[String]) -> Result<String>;
}

/// Generation capability selected at process start.
#[derive(Clone)]
pub enum Capability {
    Full(Arc<dyn LanguageModel>),
    /// No backend; callers produce template output.
    Degraded,
}

impl Capability {
    pub fn full(model: impl LanguageModel + 'static) -> Self {
        Capability::Full(Arc::new(model))
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Capability::Full(_))
    }

    pub fn describe(&self) -> &str {
        match self {
            Capability::Full(model) => model.name(),
            Capability::Degraded => "degraded",
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Full(model) => f.debug_tuple("Full").field(&model.name()).finish(),
            Capability::Degraded => f.write_str("Degraded"),
        }
    }
}

/// Build the capability for `config`. A configured backend without an API
/// key degrades instead of failing startup.
pub fn create_capability(config: &GenerationConfig, timeout: Duration) -> Result<Capability> {
    let key = config.api_key.clone().filter(|k| !k.trim().is_empty());

    let capability = match (config.backend, key) {
        (GenerationBackend::None, _) => Capability::Degraded,
        (backend, None) => {
            warn!(?backend, "Generation backend configured without API key; running degraded");
            Capability::Degraded
        }
        (GenerationBackend::OpenAi, Some(key)) => Capability::full(OpenAiChatClient::new(
            config.openai_base_url.clone(),
            config.openai_model.clone(),
            key,
            config.temperature,
            timeout,
        )?),
        (GenerationBackend::Gemini, Some(key)) => {
            Capability::full(GeminiClient::new(key, config.temperature, timeout)?)
        }
    };

    info!(capability = capability.describe(), "Generation capability resolved");
    Ok(capability)
}

/// Render context passages as a numbered block for prompts.
pub fn format_context(context: &[String]) -> String {
    if context.is_empty() {
        return "(no retrieved context)".to_string();
    }
    context
        .iter()
        .enumerate()
        .map(|(i, passage)| format!("[{}] {}", i + 1, passage.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
