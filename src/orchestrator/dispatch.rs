//! Agent fan-out
//!
//! Every agent in a dispatch round sees the same state snapshot and the
//! same context. Each call is bounded by the agent timeout; a timed-out,
//! panicked or unregistered agent yields an error output instead.

use crate::agents::{Agent, AgentRegistry};
use crate::config::DispatchStrategy;
use crate::models::{AgentName, AgentOutput, DocumentChunk, TwinState};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of one dispatch round.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Outputs in completion order.
    pub outputs: Vec<AgentOutput>,
    pub cancelled: bool,
}

pub struct Dispatcher {
    strategy: DispatchStrategy,
    agent_timeout: Duration,
}

impl Dispatcher {
    pub fn new(strategy: DispatchStrategy, agent_timeout: Duration) -> Self {
        Self {
            strategy,
            agent_timeout,
        }
    }

    pub async fn dispatch(
        &self,
        registry: &AgentRegistry,
        agents: &[AgentName],
        snapshot: Arc<TwinState>,
        context: Arc<Vec<DocumentChunk>>,
        token: &CancellationToken,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let mut runnable = Vec::with_capacity(agents.len());

        for &name in agents {
            match registry.get(name) {
                Some(agent) => runnable.push((name, agent)),
                None => {
                    warn!(agent = %name, "Agent not registered");
                    outcome
                        .outputs
                        .push(AgentOutput::error_placeholder(name, "agent not registered"));
                }
            }
        }

        match self.strategy {
            DispatchStrategy::Concurrent => {
                self.fan_out(runnable, snapshot, context, token, &mut outcome).await
            }
            DispatchStrategy::Sequential => {
                self.in_sequence(runnable, snapshot, context, token, &mut outcome).await
            }
        }

        outcome
    }

    async fn fan_out(
        &self,
        runnable: Vec<(AgentName, Arc<dyn Agent>)>,
        snapshot: Arc<TwinState>,
        context: Arc<Vec<DocumentChunk>>,
        token: &CancellationToken,
        outcome: &mut DispatchOutcome,
    ) {
        let mut pending: BTreeSet<AgentName> = runnable.iter().map(|(n, _)| *n).collect();
        let mut set = JoinSet::new();

        for (name, agent) in runnable {
            set.spawn(run_agent(
                name,
                agent,
                Arc::clone(&snapshot),
                Arc::clone(&context),
                self.agent_timeout,
            ));
        }

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    set.abort_all();
                    outcome.cancelled = true;
                    debug!(abandoned = pending.len(), "Dispatch cancelled");
                    return;
                }
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok(output)) => {
                        pending.remove(&output.agent);
                        outcome.outputs.push(output);
                    }
                    Some(Err(e)) => warn!(error = %e, "Agent task failed"),
                }
            }
        }

        // Tasks that panicked never reported back.
        for name in pending {
            outcome
                .outputs
                .push(AgentOutput::error_placeholder(name, "agent task failed"));
        }
    }

    async fn in_sequence(
        &self,
        runnable: Vec<(AgentName, Arc<dyn Agent>)>,
        snapshot: Arc<TwinState>,
        context: Arc<Vec<DocumentChunk>>,
        token: &CancellationToken,
        outcome: &mut DispatchOutcome,
    ) {
        for (name, agent) in runnable {
            let mut handle = tokio::spawn(run_agent(
                name,
                agent,
                Arc::clone(&snapshot),
                Arc::clone(&context),
                self.agent_timeout,
            ));

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    handle.abort();
                    outcome.cancelled = true;
                    return;
                }
                joined = &mut handle => match joined {
                    Ok(output) => outcome.outputs.push(output),
                    Err(e) => {
                        warn!(agent = %name, error = %e, "Agent task failed");
                        outcome
                            .outputs
                            .push(AgentOutput::error_placeholder(name, "agent task failed"));
                    }
                }
            }
        }
    }
}

async fn run_agent(
    name: AgentName,
    agent: Arc<dyn Agent>,
    snapshot: Arc<TwinState>,
    context: Arc<Vec<DocumentChunk>>,
    timeout: Duration,
) -> AgentOutput {
    match tokio::time::timeout(timeout, agent.run(&snapshot, &context)).await {
        Ok(output) if output.agent == name => output,
        Ok(output) => {
            warn!(agent = %name, wrote = %output.agent, "Agent wrote under a foreign name");
            AgentOutput::error_placeholder(name, "output under wrong agent name")
        }
        Err(_) => {
            warn!(agent = %name, timeout_ms = timeout.as_millis() as u64, "Agent timed out");
            AgentOutput::error_placeholder(name, "agent timed out")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Capability;
    use crate::models::{AgentStatus, QueryRequest, SourceType};
    use async_trait::async_trait;

    struct Panicking;

    #[async_trait]
    impl Agent for Panicking {
        fn name(&self) -> AgentName {
            AgentName::Risk
        }
        async fn run(&self, _: &TwinState, _: &[DocumentChunk]) -> AgentOutput {
            panic!("boom")
        }
    }

    struct Sleepy;

    #[async_trait]
    impl Agent for Sleepy {
        fn name(&self) -> AgentName {
            AgentName::Market
        }
        async fn run(&self, _: &TwinState, _: &[DocumentChunk]) -> AgentOutput {
            tokio::time::sleep(Duration::from_secs(5)).await;
            AgentOutput::new(AgentName::Market, "late".into(), None, AgentStatus::Ok)
        }
    }

    fn snapshot() -> Arc<TwinState> {
        Arc::new(
            TwinState::from_request(QueryRequest::question("q", SourceType::Internal)).unwrap(),
        )
    }

    fn registry() -> AgentRegistry {
        let mut registry =
            AgentRegistry::with_specialists(Capability::Degraded, Duration::from_secs(1));
        registry.register(Arc::new(Panicking));
        registry.register(Arc::new(Sleepy));
        registry
    }

    #[tokio::test]
    async fn test_failures_become_error_outputs() {
        for strategy in [DispatchStrategy::Concurrent, DispatchStrategy::Sequential] {
            let dispatcher = Dispatcher::new(strategy, Duration::from_millis(50));
            let outcome = dispatcher
                .dispatch(
                    &registry(),
                    &[AgentName::Finance, AgentName::Market, AgentName::Risk],
                    snapshot(),
                    Arc::new(Vec::new()),
                    &CancellationToken::new(),
                )
                .await;

            assert!(!outcome.cancelled);
            assert_eq!(outcome.outputs.len(), 3);
            let status = |name| {
                outcome
                    .outputs
                    .iter()
                    .find(|o| o.agent == name)
                    .map(|o| o.status)
            };
            assert_eq!(status(AgentName::Finance), Some(AgentStatus::Degraded));
            assert_eq!(status(AgentName::Market), Some(AgentStatus::Error));
            assert_eq!(status(AgentName::Risk), Some(AgentStatus::Error));
        }
    }

    #[tokio::test]
    async fn test_unregistered_agent_yields_placeholder() {
        let dispatcher = Dispatcher::new(DispatchStrategy::Concurrent, Duration::from_secs(1));
        let outcome = dispatcher
            .dispatch(
                &AgentRegistry::new(),
                &[AgentName::Compliance],
                snapshot(),
                Arc::new(Vec::new()),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(outcome.outputs[0].status, AgentStatus::Error);
        assert!(outcome.outputs[0].text.contains("not registered"));
    }

    #[tokio::test]
    async fn test_cancellation_keeps_completed_outputs() {
        let dispatcher = Dispatcher::new(DispatchStrategy::Sequential, Duration::from_secs(10));
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let outcome = dispatcher
            .dispatch(
                &registry(),
                &[AgentName::Strategy, AgentName::Market, AgentName::Innovation],
                snapshot(),
                Arc::new(Vec::new()),
                &token,
            )
            .await;

        assert!(outcome.cancelled);
        let agents: Vec<_> = outcome.outputs.iter().map(|o| o.agent).collect();
        assert_eq!(agents, vec![AgentName::Strategy]);
    }
}
