//! Merge step
//!
//! Folds a dispatch round into the run state. Outputs are applied in
//! canonical agent order so the resulting state does not depend on which
//! agent finished first.

use crate::models::{AgentOutput, AgentStatus, Message, TwinState};
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub recorded: usize,
    pub degraded: usize,
    pub errored: usize,
    /// Outputs dropped because the agent already had one.
    pub duplicates: usize,
}

pub fn merge_outputs(state: &mut TwinState, mut outputs: Vec<AgentOutput>) -> MergeSummary {
    outputs.sort_by_key(|o| o.agent);

    let mut summary = MergeSummary::default();
    for output in outputs {
        let agent = output.agent;
        let status = output.status;

        if !state.record_output(output) {
            warn!(run_id = %state.run_id, %agent, "Duplicate output dropped");
            summary.duplicates += 1;
            continue;
        }

        summary.recorded += 1;
        let note = match status {
            AgentStatus::Ok => "analysis complete",
            AgentStatus::Degraded => {
                summary.degraded += 1;
                "analysis complete (degraded)"
            }
            AgentStatus::Error => {
                summary.errored += 1;
                state.errors.push(format!("{} agent failed", agent));
                "analysis unavailable"
            }
        };
        state.push_message(Message::agent(agent, note));
    }

    debug!(
        run_id = %state.run_id,
        recorded = summary.recorded,
        degraded = summary.degraded,
        errored = summary.errored,
        "Outputs merged"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentName, QueryRequest, SourceType};

    fn outputs() -> Vec<AgentOutput> {
        vec![
            AgentOutput::new(AgentName::Risk, "risk".into(), Some(0.4), AgentStatus::Degraded),
            AgentOutput::new(AgentName::Strategy, "strategy".into(), Some(0.9), AgentStatus::Ok),
            AgentOutput::error_placeholder(AgentName::Finance, "timeout"),
        ]
    }

    fn fresh() -> TwinState {
        TwinState::from_request(QueryRequest::question("q", SourceType::Internal)).unwrap()
    }

    #[test]
    fn test_merge_is_order_independent() {
        let base = outputs();
        let mut reference: Option<serde_json::Value> = None;

        // every rotation and its reverse
        for shift in 0..base.len() {
            for reverse in [false, true] {
                let mut permuted = base.clone();
                permuted.rotate_left(shift);
                if reverse {
                    permuted.reverse();
                }

                let mut state = fresh();
                merge_outputs(&mut state, permuted);
                let outputs = serde_json::to_value(state.agent_outputs()).unwrap();
                let history: Vec<_> = state
                    .messages()
                    .iter()
                    .map(|m| (m.agent, m.content.clone()))
                    .collect();

                let snapshot = serde_json::json!({
                    "outputs": outputs,
                    "history": serde_json::to_value(&history).unwrap(),
                    "errors": state.errors,
                });
                match &reference {
                    None => reference = Some(snapshot),
                    Some(r) => assert_eq!(r, &snapshot),
                }
            }
        }
    }

    #[test]
    fn test_partial_failure_is_recorded_not_fatal() {
        let mut state = fresh();
        let summary = merge_outputs(&mut state, outputs());
        assert_eq!(summary.recorded, 3);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.degraded, 1);
        assert_eq!(state.errors, vec!["finance agent failed".to_string()]);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let mut state = fresh();
        merge_outputs(&mut state, outputs());
        let summary = merge_outputs(
            &mut state,
            vec![AgentOutput::new(AgentName::Risk, "again".into(), None, AgentStatus::Ok)],
        );
        assert_eq!(summary.duplicates, 1);
        assert_eq!(state.output(AgentName::Risk).unwrap().text, "risk");
    }
}
