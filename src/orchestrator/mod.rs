//! Orchestrator - drives one run through its phases
//!
//! INIT → RETRIEVING → DISPATCHING → MERGING → (DISPATCHING →)* FINALIZING → DONE
//!
//! Content-only runs go straight from INIT to FINALIZING; simple mode
//! finalizes directly after its single dispatch.

use crate::agents::AgentRegistry;
use crate::archive::ArchivalSink;
use crate::audit::{RunLedger, RunRecord};
use crate::classifier;
use crate::config::{OrchestratorConfig, RunMode};
use crate::error::OrchestrationError;
use crate::models::{AgentName, Message, QueryRequest, RunPhase, TwinState, RETRIEVED_DOCS};
use crate::retrieval::RetrievalGateway;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod builder;
pub mod dispatch;
pub mod merge;
pub mod routing;
pub mod synthesis;

pub use builder::OrchestratorBuilder;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use merge::{merge_outputs, MergeSummary};
pub use routing::{KeywordRouter, NoRouting, Router};
pub use synthesis::{fallback_memo, Synthesizer};

pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: AgentRegistry,
    gateway: RetrievalGateway,
    dispatcher: Dispatcher,
    synthesizer: Synthesizer,
    router: Arc<dyn Router>,
    archive: Option<ArchivalSink>,
    ledger: Arc<RunLedger>,
}

impl Orchestrator {
    pub fn builder(config: OrchestratorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn gateway(&self) -> &RetrievalGateway {
        &self.gateway
    }

    pub fn ledger(&self) -> &Arc<RunLedger> {
        &self.ledger
    }

    /// Run a request to completion.
    pub async fn run(&self, request: QueryRequest) -> Result<TwinState> {
        self.run_with_cancellation(request, CancellationToken::new()).await
    }

    /// Run a request, aborting before finalization if `token` fires. An
    /// aborted run returns `Cancelled` with the outputs completed so far.
    pub async fn run_with_cancellation(
        &self,
        request: QueryRequest,
        token: CancellationToken,
    ) -> Result<TwinState> {
        let started = Instant::now();
        let mut state = TwinState::from_request(request)?;

        info!(
            run_id = %state.run_id,
            source_type = %state.source_type,
            content_only = state.is_content_only(),
            mode = ?self.config.mode,
            "Orchestrator: starting run"
        );

        if state.is_content_only() {
            self.advance(&mut state, RunPhase::Finalizing)?;
            let ack = format!(
                "Payload {} accepted for archival (source_type: {})",
                state.payload_ref.as_deref().unwrap_or_default(),
                state.source_type
            );
            state.set_final_answer(ack)?;
        } else {
            self.retrieve(&mut state, &token).await?;
            match self.config.mode {
                RunMode::Simple => self.run_simple(&mut state, &token).await?,
                RunMode::MultiAgent => self.run_multi_agent(&mut state, &token).await?,
            }
        }

        self.advance(&mut state, RunPhase::Done)?;
        self.finish(&state).await;

        info!(
            run_id = %state.run_id,
            agents = state.agent_outputs().len(),
            redispatches = state.redispatch_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Orchestrator: run complete"
        );
        Ok(state)
    }

    // ========================================================
    // Phases
    // ========================================================

    async fn retrieve(&self, state: &mut TwinState, token: &CancellationToken) -> Result<()> {
        self.advance(state, RunPhase::Retrieving)?;

        let query = state.question_text().to_string();
        let retrieval = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(self.cancelled(state)),
            r = self.gateway.retrieve(&query, self.config.top_k, Some(state.source_type)) => r,
        };

        state.retrieval_available = retrieval.available;
        let found = retrieval.chunks.len();
        state.attach_context(RETRIEVED_DOCS, retrieval.chunks);
        state.push_message(Message::orchestrator(if retrieval.available {
            format!("retrieved {} context chunks", found)
        } else {
            "context store unavailable; continuing without context".to_string()
        }));

        self.advance(state, RunPhase::Dispatching)
    }

    async fn run_simple(&self, state: &mut TwinState, token: &CancellationToken) -> Result<()> {
        let agent = self.config.simple_agent;
        self.dispatch_round(state, &[agent], token).await?;
        self.advance(state, RunPhase::Finalizing)?;

        let answer = match state.output(agent) {
            Some(output) if !output.text.trim().is_empty() => output.text.clone(),
            _ => fallback_memo(state),
        };
        state.set_final_answer(answer)
    }

    async fn run_multi_agent(&self, state: &mut TwinState, token: &CancellationToken) -> Result<()> {
        let roster = self.roster(state);
        state.push_message(Message::orchestrator(format!(
            "dispatching {} agents: {}",
            roster.len(),
            roster.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ")
        )));

        self.dispatch_round(state, &roster, token).await?;
        self.advance(state, RunPhase::Merging)?;

        while state.redispatch_count < self.config.max_redispatch {
            let Some(next) = self.router.next_agent(state).await else {
                break;
            };
            state.next_agent = Some(next);
            self.advance(state, RunPhase::Dispatching)?;

            let Some(next) = state.next_agent.take() else {
                break;
            };
            state.redispatch_count += 1;
            state.push_message(Message::orchestrator(format!("re-dispatching {}", next)));

            if state.output(next).is_some() {
                debug!(run_id = %state.run_id, agent = %next, "Agent already answered; directive consumed");
            } else {
                self.dispatch_round(state, &[next], token).await?;
            }
            self.advance(state, RunPhase::Merging)?;
        }

        if token.is_cancelled() {
            return Err(self.cancelled(state));
        }

        self.advance(state, RunPhase::Finalizing)?;
        let memo = self.synthesizer.synthesize(state).await;
        state.set_final_answer(memo)
    }

    /// Dispatch `agents` against a snapshot of `state` and merge the results.
    async fn dispatch_round(
        &self,
        state: &mut TwinState,
        agents: &[AgentName],
        token: &CancellationToken,
    ) -> Result<()> {
        if token.is_cancelled() {
            return Err(self.cancelled(state));
        }

        let snapshot = Arc::new(state.clone());
        let context = Arc::new(state.context_chunks());
        let outcome = self
            .dispatcher
            .dispatch(&self.registry, agents, snapshot, context, token)
            .await;

        merge_outputs(state, outcome.outputs);
        if outcome.cancelled {
            return Err(self.cancelled(state));
        }
        Ok(())
    }

    /// Agents for a multi-agent run: the configured roster, or the
    /// source-type selection, in canonical order.
    fn roster(&self, state: &TwinState) -> Vec<AgentName> {
        match &self.config.agents {
            Some(agents) => classifier::canonical(agents),
            None => classifier::select_agents(state.source_type),
        }
    }

    // ========================================================
    // Helpers
    // ========================================================

    fn advance(&self, state: &mut TwinState, next: RunPhase) -> Result<()> {
        let from = state.phase();
        state.transition(next)?;
        debug!(run_id = %state.run_id, %from, to = %next, "Phase transition");
        Ok(())
    }

    fn cancelled(&self, state: &mut TwinState) -> OrchestrationError {
        warn!(
            run_id = %state.run_id,
            phase = %state.phase(),
            completed = state.agent_outputs().len(),
            "Run cancelled"
        );
        state.fail("run cancelled before finalization");
        OrchestrationError::Cancelled {
            run_id: state.run_id,
            partial: Box::new(state.clone()),
        }
    }

    /// Post-DONE bookkeeping. Never fails the run.
    async fn finish(&self, state: &TwinState) {
        if let Err(e) = self.ledger.record(RunRecord::from_state(state)).await {
            warn!(run_id = %state.run_id, error = %e, "Failed to record run");
        }

        if let Some(sink) = &self.archive {
            let timeout = self.config.archival_timeout;
            match tokio::time::timeout(timeout, sink.archive(state)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!(run_id = %state.run_id, error = %e, "Archival failed; run result unaffected");
                }
                Err(_) => {
                    warn!(
                        run_id = %state.run_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Archival timed out; write dropped"
                    );
                }
            }
        }
    }
}
