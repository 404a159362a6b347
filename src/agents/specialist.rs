//! Profile-driven specialist agent.

use super::profiles::{profile, AgentProfile};
use super::Agent;
use crate::generation::Capability;
use crate::models::{AgentName, AgentOutput, AgentStatus, DocumentChunk, TwinState};
use std::time::Duration;
use tracing::{debug, warn};

/// Passages handed to the generation capability per agent.
const MAX_PASSAGES: usize = 4;
const EXCERPT_CHARS: usize = 200;

const CONFIDENCE_GROUNDED: f32 = 0.9;
const CONFIDENCE_UNGROUNDED: f32 = 0.4;
const CONFIDENCE_TEMPLATE: f32 = 0.2;

pub struct SpecialistAgent {
    profile: &'static AgentProfile,
    capability: Capability,
    generation_timeout: Duration,
}

impl SpecialistAgent {
    pub fn new(name: AgentName, capability: Capability, generation_timeout: Duration) -> Self {
        Self {
            profile: profile(name),
            capability,
            generation_timeout,
        }
    }

    fn prompt(&self, question: &str) -> String {
        format!("{}: {}", self.profile.instruction, question)
    }

    fn render(&self, question: &str, analysis: &str, passages: usize) -> String {
        let focus = self
            .profile
            .focus_areas
            .iter()
            .map(|area| format!("• {}", area))
            .collect::<Vec<_>>()
            .join("\n");

        let sources = match passages {
            0 => "none retrieved".to_string(),
            1 => "1 passage".to_string(),
            n => format!("{} passages", n),
        };

        format!(
            "{}\n\nQuestion: {}\n\n{}\n\nFocus Areas:\n{}\n\nSources: {}",
            self.profile.title,
            question,
            analysis.trim(),
            focus,
            sources
        )
    }

    fn template_analysis(&self, question: &str, passages: &[String]) -> String {
        let mut text = format!(
            "{} {}. Generation capability unavailable; findings below are drawn directly from the retrieved material.",
            self.profile.instruction, question
        );
        match passages.first() {
            Some(top) => {
                text.push_str("\n\nKey excerpt: ");
                text.push_str(&excerpt(top, EXCERPT_CHARS));
            }
            None => text.push_str("\n\nNo supporting documents were retrieved."),
        }
        text
    }
}

#[async_trait::async_trait]
impl Agent for SpecialistAgent {
    fn name(&self) -> AgentName {
        self.profile.name
    }

    async fn run(&self, state: &TwinState, context: &[DocumentChunk]) -> AgentOutput {
        let agent = self.profile.name;
        let question = state.question_text();
        let passages = rank_passages(context, self.profile.focus_terms, MAX_PASSAGES);

        let model = match &self.capability {
            Capability::Full(model) => model,
            Capability::Degraded => {
                debug!(%agent, "No generation capability; using template analysis");
                let analysis = self.template_analysis(question, &passages);
                return AgentOutput::new(
                    agent,
                    self.render(question, &analysis, passages.len()),
                    Some(CONFIDENCE_TEMPLATE),
                    AgentStatus::Degraded,
                );
            }
        };

        let prompt = self.prompt(question);
        let generated =
            tokio::time::timeout(self.generation_timeout, model.generate(&prompt, &passages)).await;

        match generated {
            Ok(Ok(analysis)) if !analysis.trim().is_empty() => {
                let (status, confidence) = if passages.is_empty() {
                    (AgentStatus::Degraded, CONFIDENCE_UNGROUNDED)
                } else {
                    (AgentStatus::Ok, CONFIDENCE_GROUNDED)
                };
                AgentOutput::new(
                    agent,
                    self.render(question, &analysis, passages.len()),
                    Some(confidence),
                    status,
                )
            }
            Ok(Ok(_)) => {
                warn!(%agent, backend = model.name(), "Generation returned empty text");
                AgentOutput::error_placeholder(agent, "empty generation")
            }
            Ok(Err(e)) => {
                warn!(%agent, backend = model.name(), error = %e, "Generation failed");
                AgentOutput::error_placeholder(agent, "generation failed")
            }
            Err(_) => {
                warn!(
                    %agent,
                    backend = model.name(),
                    timeout_ms = self.generation_timeout.as_millis() as u64,
                    "Generation timed out"
                );
                AgentOutput::error_placeholder(agent, "generation timed out")
            }
        }
    }
}

/// Order passages by how many focus terms they mention, keeping retrieval
/// order among equals.
fn rank_passages(context: &[DocumentChunk], focus_terms: &[&str], limit: usize) -> Vec<String> {
    let mut scored: Vec<(usize, usize)> = context
        .iter()
        .enumerate()
        .map(|(idx, chunk)| {
            let lowered = chunk.text.to_lowercase();
            let hits = focus_terms.iter().filter(|t| lowered.contains(**t)).count();
            (idx, hits)
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    scored
        .into_iter()
        .take(limit)
        .map(|(idx, _)| context[idx].text.clone())
        .collect()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GeminiClient, MockLanguageModel};
    use crate::models::{Metadata, QueryRequest, SourceType};

    fn state() -> TwinState {
        TwinState::from_request(QueryRequest::question(
            "What is the CAPEX estimate?",
            SourceType::Internal,
        ))
        .unwrap()
    }

    fn chunk(text: &str) -> DocumentChunk {
        DocumentChunk {
            id: text.to_string(),
            text: text.to_string(),
            embedding: vec![],
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_degraded_capability_uses_template() {
        let agent = SpecialistAgent::new(AgentName::Finance, Capability::Degraded, Duration::from_secs(1));
        let out = agent.run(&state(), &[]).await;

        assert_eq!(out.status, AgentStatus::Degraded);
        assert!(out.text.starts_with("FINANCIAL ANALYSIS"));
        assert!(out.text.contains("Question: What is the CAPEX estimate?"));
        assert!(out.text.contains("No supporting documents were retrieved."));
        assert!(out.text.contains("Sources: none retrieved"));
    }

    #[tokio::test]
    async fn test_grounded_generation_is_ok() {
        let agent = SpecialistAgent::new(
            AgentName::Finance,
            Capability::full(MockLanguageModel::echo()),
            Duration::from_secs(1),
        );
        let out = agent.run(&state(), &[chunk("CAPEX estimate: 40M EUR")]).await;

        assert_eq!(out.status, AgentStatus::Ok);
        assert_eq!(out.confidence, Some(CONFIDENCE_GROUNDED));
        assert!(out.text.contains("grounded on 1 passages"));
    }

    #[tokio::test]
    async fn test_generation_without_context_is_degraded() {
        let agent = SpecialistAgent::new(
            AgentName::Risk,
            Capability::full(MockLanguageModel::echo()),
            Duration::from_secs(1),
        );
        let out = agent.run(&state(), &[]).await;
        assert_eq!(out.status, AgentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_generation_failure_becomes_error_placeholder() {
        let agent = SpecialistAgent::new(
            AgentName::Market,
            Capability::full(MockLanguageModel::failing("provider down")),
            Duration::from_secs(1),
        );
        let out = agent.run(&state(), &[chunk("anything")]).await;
        assert_eq!(out.status, AgentStatus::Error);
        assert!(out.text.starts_with("[market analysis unavailable"));
        assert!(!out.text.contains("provider down"));
        assert_eq!(out.confidence, None);
    }

    #[tokio::test]
    async fn test_failed_gemini_call_keeps_key_out_of_output() {
        let client = GeminiClient::new("SECRET-KEY-123".into(), 0.2, Duration::from_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:9/v1beta/models/x:generateContent");
        let agent = SpecialistAgent::new(
            AgentName::Finance,
            Capability::full(client),
            Duration::from_secs(5),
        );
        let out = agent.run(&state(), &[chunk("CAPEX estimate: 40M EUR")]).await;

        assert_eq!(out.status, AgentStatus::Error);
        assert_eq!(out.text, "[finance analysis unavailable: generation failed]");
        assert!(!out.text.contains("SECRET-KEY-123"));
    }

    #[tokio::test]
    async fn test_generation_timeout_becomes_error_placeholder() {
        let agent = SpecialistAgent::new(
            AgentName::Strategy,
            Capability::full(MockLanguageModel::slow(Duration::from_millis(200))),
            Duration::from_millis(10),
        );
        let out = agent.run(&state(), &[]).await;
        assert_eq!(out.status, AgentStatus::Error);
        assert!(out.text.contains("timed out"));
    }

    #[test]
    fn test_passages_ranked_by_focus_terms() {
        let context = vec![
            chunk("harbour permits"),
            chunk("capex and funding plan"),
            chunk("revenue"),
        ];
        let ranked = rank_passages(&context, &["capex", "funding", "revenue"], 2);
        assert_eq!(ranked, vec!["capex and funding plan", "revenue"]);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "é".repeat(300);
        let out = excerpt(&text, 10);
        assert_eq!(out, format!("{}...", "é".repeat(10)));
    }
}
