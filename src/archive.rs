//! Archival Sink
//!
//! Writes a finished run back into the context store so its agent outputs
//! and final answer become retrieval candidates for later runs.

use crate::error::OrchestrationError;
use crate::models::{Metadata, Priority, TwinState};
use crate::store::{ContextStore, TextSplitter};
use crate::Result;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub const KIND_AGENT_OUTPUT: &str = "agent_output";
pub const KIND_FINAL_ANSWER: &str = "final_answer";
pub const KIND_PAYLOAD: &str = "payload";

const RESERVED_KEYS: &[&str] = &[
    "source_type",
    "agent",
    "run_id",
    "timestamp",
    "kind",
    "chunk",
    "question",
    "source_id",
    "priority",
    "status",
];

pub struct ArchivalSink {
    store: Arc<dyn ContextStore>,
    splitter: TextSplitter,
}

impl ArchivalSink {
    pub fn new(store: Arc<dyn ContextStore>, splitter: TextSplitter) -> Self {
        Self { store, splitter }
    }

    /// Texts and metadata that archiving `state` would write, in order:
    /// agent outputs in canonical order, then the final answer. Content-only
    /// runs archive their payload reference instead.
    pub fn entries(&self, state: &TwinState) -> (Vec<String>, Vec<Metadata>) {
        let timestamp = Utc::now().to_rfc3339();
        let base = base_metadata(state, &timestamp);

        let mut texts = Vec::new();
        let mut metadatas = Vec::new();

        if let Some(payload_ref) = &state.payload_ref {
            let mut meta = base.clone();
            for (key, value) in &state.metadata {
                if !RESERVED_KEYS.contains(&key.as_str()) {
                    meta.insert(key.clone(), value.clone());
                }
            }
            meta.insert("agent".into(), Value::Null);
            meta.insert("kind".into(), json!(KIND_PAYLOAD));
            meta.insert("payload_ref".into(), json!(payload_ref));
            self.push_split(payload_ref, meta, &mut texts, &mut metadatas);
            return (texts, metadatas);
        }

        for (agent, output) in state.agent_outputs() {
            let mut meta = base.clone();
            meta.insert("agent".into(), json!(agent.as_str()));
            meta.insert("kind".into(), json!(KIND_AGENT_OUTPUT));
            meta.insert("status".into(), serde_json::to_value(output.status).unwrap_or(Value::Null));
            self.push_split(&output.text, meta, &mut texts, &mut metadatas);
        }

        if let Some(answer) = state.final_answer() {
            let mut meta = base;
            meta.insert("agent".into(), json!("orchestrator"));
            meta.insert("kind".into(), json!(KIND_FINAL_ANSWER));
            self.push_split(answer, meta, &mut texts, &mut metadatas);
        }

        (texts, metadatas)
    }

    fn push_split(
        &self,
        text: &str,
        meta: Metadata,
        texts: &mut Vec<String>,
        metadatas: &mut Vec<Metadata>,
    ) {
        for (idx, piece) in self.splitter.split(text).into_iter().enumerate() {
            let mut m = meta.clone();
            m.insert("chunk".into(), json!(idx));
            texts.push(piece);
            metadatas.push(m);
        }
    }

    /// Persist `state` into the store. Returns the new chunk ids.
    pub async fn archive(&self, state: &TwinState) -> Result<Vec<String>> {
        let (texts, metadatas) = self.entries(state);
        if texts.is_empty() {
            debug!(run_id = %state.run_id, "Nothing to archive");
            return Ok(Vec::new());
        }

        let count = texts.len();
        let ids = self
            .store
            .add_texts(texts, Some(metadatas))
            .await
            .map_err(|e| {
                OrchestrationError::ArchivalError(format!("run {}: {}", state.run_id, e))
            })?;

        info!(
            run_id = %state.run_id,
            chunks = count,
            store = self.store.name(),
            "Run archived"
        );
        Ok(ids)
    }
}

fn base_metadata(state: &TwinState, timestamp: &str) -> Metadata {
    let priority = match state.priority {
        Priority::High => "high",
        Priority::Normal => "normal",
        Priority::Low => "low",
    };

    let mut meta = Metadata::new();
    meta.insert("source_type".into(), json!(state.source_type.as_str()));
    meta.insert("run_id".into(), json!(state.run_id.to_string()));
    meta.insert("timestamp".into(), json!(timestamp));
    meta.insert("priority".into(), json!(priority));
    if let Some(question) = &state.question {
        meta.insert("question".into(), json!(question));
    }
    if let Some(source_id) = &state.source_id {
        meta.insert("source_id".into(), json!(source_id));
    }
    meta
}
