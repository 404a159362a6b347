//! Agent trait and registry
//!
//! Agents are pure functions of a state snapshot and the retrieved
//! context. They never write to shared state; the orchestrator merges
//! what they return.

use crate::generation::Capability;
use crate::models::{AgentName, AgentOutput, DocumentChunk, TwinState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub mod profiles;
pub mod specialist;

pub use profiles::{profile, AgentProfile};
pub use specialist::SpecialistAgent;

/// Trait for a single agent unit
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> AgentName;

    /// Produce this agent's contribution. Failures are folded into the
    /// returned output's status, never raised.
    async fn run(&self, state: &TwinState, context: &[DocumentChunk]) -> AgentOutput;
}

/// Agent registry for looking up agents by name
pub struct AgentRegistry {
    agents: HashMap<AgentName, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Registry holding one specialist per agent name.
    pub fn with_specialists(capability: Capability, generation_timeout: Duration) -> Self {
        let mut registry = Self::new();
        for name in AgentName::ALL {
            registry.register(Arc::new(SpecialistAgent::new(
                name,
                capability.clone(),
                generation_timeout,
            )));
        }
        registry
    }

    /// Register an agent, replacing any previous one under the same name.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.name(), agent);
    }

    pub fn get(&self, name: AgentName) -> Option<Arc<dyn Agent>> {
        self.agents.get(&name).cloned()
    }

    /// Registered names in canonical order.
    pub fn list(&self) -> Vec<AgentName> {
        let mut names: Vec<AgentName> = self.agents.keys().copied().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialist_registry_covers_every_agent() {
        let registry = AgentRegistry::with_specialists(Capability::Degraded, Duration::from_secs(1));
        assert_eq!(registry.list(), AgentName::ALL.to_vec());
        assert!(registry.get(AgentName::GreenHill).is_some());
    }

    #[test]
    fn test_empty_registry() {
        let registry = AgentRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.get(AgentName::Risk).is_none());
    }
}
