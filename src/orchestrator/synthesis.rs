//! Final synthesis
//!
//! Produces the run's final answer from the merged agent outputs. Any
//! failure of the generation capability falls back to a deterministic
//! memo, so question-mode runs always end with an answer.

use crate::agents::profile;
use crate::generation::Capability;
use crate::models::{AgentStatus, TwinState};
use std::time::Duration;
use tracing::{debug, warn};

const EXCERPT_LINES: usize = 4;

pub struct Synthesizer {
    capability: Capability,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(capability: Capability, timeout: Duration) -> Self {
        Self { capability, timeout }
    }

    pub async fn synthesize(&self, state: &TwinState) -> String {
        let Capability::Full(model) = &self.capability else {
            return fallback_memo(state);
        };

        let sections: Vec<String> = state
            .agent_outputs()
            .values()
            .map(|o| format!("[{}] {}", o.agent, o.text))
            .collect();
        let prompt = format!(
            "Write an integrated executive memo answering: {}\nCombine the specialist analyses below, resolve conflicts explicitly, and end with recommendations.",
            state.question_text()
        );

        match tokio::time::timeout(self.timeout, model.generate(&prompt, &sections)).await {
            Ok(Ok(memo)) if !memo.trim().is_empty() => {
                debug!(run_id = %state.run_id, backend = model.name(), "Synthesis generated");
                memo
            }
            Ok(Ok(_)) => {
                warn!(run_id = %state.run_id, "Synthesis returned empty text; using fallback memo");
                fallback_memo(state)
            }
            Ok(Err(e)) => {
                warn!(run_id = %state.run_id, error = %e, "Synthesis failed; using fallback memo");
                fallback_memo(state)
            }
            Err(_) => {
                warn!(run_id = %state.run_id, "Synthesis timed out; using fallback memo");
                fallback_memo(state)
            }
        }
    }
}

/// Deterministic memo over the merged outputs, in canonical agent order.
pub fn fallback_memo(state: &TwinState) -> String {
    let outputs = state.agent_outputs();
    let mut memo = String::from("# Digital Twin Analysis\n\n");

    memo.push_str(&format!("**Question:** {}\n\n", state.question_text()));
    memo.push_str("## Executive Summary\n");

    if outputs.is_empty() {
        memo.push_str("No agent analyses were available for this run.\n\n");
    } else {
        let names: Vec<&str> = outputs.keys().map(|a| a.as_str()).collect();
        memo.push_str(&format!(
            "Based on {} agent analyses ({}).\n\n",
            outputs.len(),
            names.join(", ")
        ));
    }

    if !state.retrieval_available {
        memo.push_str("_Context store unavailable; analyses ran without retrieved documents._\n\n");
    }

    for (agent, output) in outputs {
        let title = profile(*agent).title;
        let tag = match output.status {
            AgentStatus::Ok => "ok",
            AgentStatus::Degraded => "degraded",
            AgentStatus::Error => "error",
        };
        memo.push_str(&format!("### {} [{}]\n{}\n\n", title, tag, key_lines(&output.text, title)));
    }

    memo.push_str(
        "## Integrated Recommendations\n\
         1. Validate the figures above against the latest internal documents.\n\
         2. Prioritise high-impact, low-risk initiatives first.\n\
         3. Re-run the analysis once missing context or capabilities are restored.\n",
    );
    memo
}

/// Up to a few lines of analysis, skipping the title and question echo.
fn key_lines(text: &str, title: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != title && !l.starts_with("Question:"))
        .take(EXCERPT_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MockLanguageModel;
    use crate::models::{AgentName, AgentOutput, QueryRequest, SourceType};

    fn state_with_outputs() -> TwinState {
        let mut state = TwinState::from_request(QueryRequest::question(
            "What is the CAPEX estimate?",
            SourceType::Internal,
        ))
        .unwrap();
        state.record_output(AgentOutput::new(
            AgentName::Risk,
            "RISK ANALYSIS\n\nQuestion: What is the CAPEX estimate?\n\nPermit delays".into(),
            None,
            AgentStatus::Degraded,
        ));
        state.record_output(AgentOutput::error_placeholder(AgentName::Finance, "timeout"));
        state
    }

    #[test]
    fn test_fallback_is_canonical_and_tagged() {
        let memo = fallback_memo(&state_with_outputs());
        let finance = memo.find("### FINANCIAL ANALYSIS [error]").unwrap();
        let risk = memo.find("### RISK ANALYSIS [degraded]\nPermit delays").unwrap();
        assert!(finance < risk);
        assert!(memo.contains("**Question:** What is the CAPEX estimate?"));
        assert!(memo.contains("Context store unavailable"));
    }

    #[test]
    fn test_fallback_without_outputs_is_non_empty() {
        let state =
            TwinState::from_request(QueryRequest::question("q", SourceType::Public)).unwrap();
        let memo = fallback_memo(&state);
        assert!(memo.contains("No agent analyses were available"));
    }

    #[tokio::test]
    async fn test_failed_generation_falls_back() {
        let state = state_with_outputs();
        let synth = Synthesizer::new(
            Capability::full(MockLanguageModel::failing("down")),
            Duration::from_secs(1),
        );
        assert_eq!(synth.synthesize(&state).await, fallback_memo(&state));
    }

    #[tokio::test]
    async fn test_generated_memo_is_used() {
        let synth = Synthesizer::new(
            Capability::full(MockLanguageModel::fixed("Integrated memo")),
            Duration::from_secs(1),
        );
        assert_eq!(synth.synthesize(&state_with_outputs()).await, "Integrated memo");
    }
}
