//! Dynamic routing
//!
//! After each merge the orchestrator asks its router whether one more
//! agent should run. The orchestrator bounds how often that can happen.

use crate::agents::profile;
use crate::models::{AgentName, TwinState};
use async_trait::async_trait;

#[async_trait]
pub trait Router: Send + Sync {
    fn name(&self) -> &str;

    /// Agent to dispatch next, or `None` to finalize.
    async fn next_agent(&self, state: &TwinState) -> Option<AgentName>;
}

/// Never re-dispatches.
pub struct NoRouting;

#[async_trait]
impl Router for NoRouting {
    fn name(&self) -> &str {
        "off"
    }

    async fn next_agent(&self, _state: &TwinState) -> Option<AgentName> {
        None
    }
}

/// Proposes the first agent, in canonical order, whose trigger words occur
/// in the question and that has not answered yet.
pub struct KeywordRouter;

impl KeywordRouter {
    fn normalize(text: &str) -> String {
        let cleaned: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '&' { c } else { ' ' })
            .collect();
        format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn triggered(question: &str) -> Vec<AgentName> {
        let haystack = Self::normalize(question);
        AgentName::ALL
            .into_iter()
            .filter(|agent| {
                profile(*agent)
                    .triggers
                    .iter()
                    .any(|t| haystack.contains(&format!(" {} ", t)))
            })
            .collect()
    }
}

#[async_trait]
impl Router for KeywordRouter {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn next_agent(&self, state: &TwinState) -> Option<AgentName> {
        Self::triggered(state.question_text())
            .into_iter()
            .find(|agent| state.output(*agent).is_none())
    }
}
