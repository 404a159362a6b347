//! Scripted language model for offline runs and tests.

use super::LanguageModel;
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Behaviour {
    Echo,
    Fixed(String),
    Fail(String),
    Slow(Duration),
    /// Fail when the prompt contains the marker, echo otherwise.
    FailOn(String),
}

/// Mock model with deterministic responses
#[derive(Debug)]
pub struct MockLanguageModel {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl MockLanguageModel {
    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    /// Echo the first prompt line and the number of context passages.
    pub fn echo() -> Self {
        Self::with(Behaviour::Echo)
    }

    pub fn fixed(text: impl Into<String>) -> Self {
        Self::with(Behaviour::Fixed(text.into()))
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with(Behaviour::Fail(reason.into()))
    }

    /// Sleep for `delay` before echoing.
    pub fn slow(delay: Duration) -> Self {
        Self::with(Behaviour::Slow(delay))
    }

    pub fn failing_on(marker: impl Into<String>) -> Self {
        Self::with(Behaviour::FailOn(marker.into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn echo_text(prompt: &str, context: &[String]) -> String {
        let head = prompt.lines().next().unwrap_or_default();
        format!("{} (grounded on {} passages)", head, context.len())
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str, context: &[String]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.behaviour {
            Behaviour::Echo => Ok(Self::echo_text(prompt, context)),
            Behaviour::Fixed(text) => Ok(text.clone()),
            Behaviour::Fail(reason) => Err(OrchestrationError::GenerationError(reason.clone())),
            Behaviour::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Self::echo_text(prompt, context))
            }
            Behaviour::FailOn(marker) if prompt.contains(marker.as_str()) => Err(
                OrchestrationError::GenerationError(format!("scripted failure on '{}'", marker)),
            ),
            Behaviour::FailOn(_) => Ok(Self::echo_text(prompt, context)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_reports_context_size() {
        let model = MockLanguageModel::echo();
        let out = model
            .generate("Finance view\nmore", &["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(out, "Finance view (grounded on 2 passages)");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_on_marker() {
        let model = MockLanguageModel::failing_on("Risk");
        assert!(model.generate("Risk analysis", &[]).await.is_err());
        assert!(model.generate("Market analysis", &[]).await.is_ok());
    }
}
