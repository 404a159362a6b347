//! Run ledger
//!
//! Every finished run is recorded with a digest over its agent outputs and
//! final answer, so records can be verified and runs compared.

use crate::models::{AgentName, AgentOutput, RunPhase, SourceType, TwinState};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub source_type: SourceType,
    pub question: Option<String>,
    pub payload_ref: Option<String>,
    pub phase: RunPhase,
    pub agent_outputs: BTreeMap<AgentName, AgentOutput>,
    pub final_answer: Option<String>,
    pub redispatch_count: u32,
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn from_state(state: &TwinState) -> Self {
        Self {
            run_id: state.run_id,
            source_type: state.source_type,
            question: state.question.clone(),
            payload_ref: state.payload_ref.clone(),
            phase: state.phase(),
            agent_outputs: state.agent_outputs().clone(),
            final_answer: state.final_answer().map(str::to_string),
            redispatch_count: state.redispatch_count,
            digest: run_digest(state),
            created_at: state.created_at,
            recorded_at: Utc::now(),
        }
    }
}

/// Ledger storage
pub struct RunLedger {
    records: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store a record for a finished run
    pub async fn record(&self, record: RunRecord) -> Result<Uuid> {
        let run_id = record.run_id;
        let mut records = self.records.write().await;
        records.insert(run_id, record);
        Ok(run_id)
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&run_id).cloned())
    }

    /// All run ids, oldest first
    pub async fn list(&self) -> Result<Vec<Uuid>> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records
            .iter()
            .map(|(id, record)| (*id, record.created_at))
            .collect();

        items.sort_by_key(|(id, created_at)| (*created_at, *id));

        Ok(items.into_iter().map(|(id, _)| id).collect())
    }

    /// Recompute a record's digest and compare it with the stored one
    pub async fn verify_integrity(&self, run_id: Uuid) -> Result<bool> {
        let records = self.records.read().await;

        match records.get(&run_id) {
            Some(record) => {
                let current = compute_digest(&record.agent_outputs, record.final_answer.as_deref());
                Ok(current == record.digest)
            }
            None => Ok(false),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for RunLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct DigestView<'a> {
    agent_outputs: &'a BTreeMap<AgentName, AgentOutput>,
    final_answer: Option<&'a str>,
}

/// SHA-256 over the merged outputs and final answer of `state`.
pub fn run_digest(state: &TwinState) -> String {
    compute_digest(state.agent_outputs(), state.final_answer())
}

/// Streams canonical JSON straight into the hasher.
pub fn compute_digest(
    agent_outputs: &BTreeMap<AgentName, AgentOutput>,
    final_answer: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    let view = DigestView {
        agent_outputs,
        final_answer,
    };

    if serde_json::to_writer(&mut HashWriter(&mut hasher), &view).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
