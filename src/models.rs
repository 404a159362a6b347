//! Core data models for the digital twin

use crate::error::OrchestrationError;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Arbitrary key-value metadata attached to chunks and payloads.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

//
// ================= Enums =================
//

/// Closed set of agent specializations.
///
/// Ordering is the canonical pipeline order and is used wherever a
/// deterministic iteration over agents is needed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    Strategy,
    Operations,
    Finance,
    Market,
    Risk,
    Compliance,
    Innovation,
    GreenHill,
}

impl AgentName {
    pub const ALL: [AgentName; 8] = [
        AgentName::Strategy,
        AgentName::Operations,
        AgentName::Finance,
        AgentName::Market,
        AgentName::Risk,
        AgentName::Compliance,
        AgentName::Innovation,
        AgentName::GreenHill,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Strategy => "strategy",
            AgentName::Operations => "operations",
            AgentName::Finance => "finance",
            AgentName::Market => "market",
            AgentName::Risk => "risk",
            AgentName::Compliance => "compliance",
            AgentName::Innovation => "innovation",
            AgentName::GreenHill => "green_hill",
        }
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentName {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(|c: char| c == '-' || c == ' ', "_");
        match normalized.as_str() {
            "strategy" => Ok(AgentName::Strategy),
            "operations" => Ok(AgentName::Operations),
            "finance" => Ok(AgentName::Finance),
            "market" | "market_intel" | "marketintel" => Ok(AgentName::Market),
            "risk" => Ok(AgentName::Risk),
            "compliance" => Ok(AgentName::Compliance),
            "innovation" => Ok(AgentName::Innovation),
            "green_hill" | "greenhill" | "greenhillgpt" => Ok(AgentName::GreenHill),
            _ => Err(OrchestrationError::ValidationError(format!(
                "unknown agent name: {}",
                s
            ))),
        }
    }
}

/// Provenance of a request or payload.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    Public,
    Internal,
    WebSource,
    Master,
    Shareholder,
    Investor,
    Supplier,
    Provider,
    OcsFeed,
    #[serde(other)]
    Unknown,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Public => "public",
            SourceType::Internal => "internal",
            SourceType::WebSource => "web_source",
            SourceType::Master => "master",
            SourceType::Shareholder => "shareholder",
            SourceType::Investor => "investor",
            SourceType::Supplier => "supplier",
            SourceType::Provider => "provider",
            SourceType::OcsFeed => "ocs_feed",
            SourceType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let st = match s.trim().to_lowercase().replace('-', "_").as_str() {
            "public" => SourceType::Public,
            "internal" => SourceType::Internal,
            "web_source" | "web" => SourceType::WebSource,
            "master" => SourceType::Master,
            "shareholder" => SourceType::Shareholder,
            "investor" => SourceType::Investor,
            "supplier" => SourceType::Supplier,
            "provider" => SourceType::Provider,
            "ocs_feed" => SourceType::OcsFeed,
            _ => SourceType::Unknown,
        };
        Ok(st)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Ok,
    /// Ran without required context or capability; best-effort result.
    Degraded,
    /// Caught an internal failure; text is a placeholder.
    Error,
}

//
// ================= Agent Output =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentOutput {
    pub agent: AgentName,
    pub text: String,
    pub confidence: Option<f32>,
    pub status: AgentStatus,
}

impl AgentOutput {
    pub fn new(agent: AgentName, text: String, confidence: Option<f32>, status: AgentStatus) -> Self {
        Self {
            agent,
            text,
            confidence: confidence
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0)),
            status,
        }
    }

    /// Placeholder output for a unit that failed internally.
    pub fn error_placeholder(agent: AgentName, reason: &str) -> Self {
        Self::new(
            agent,
            format!("[{} analysis unavailable: {}]", agent, reason),
            None,
            AgentStatus::Error,
        )
    }
}

//
// ================= Messages =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Orchestrator,
    Agent,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub agent: Option<AgentName>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn orchestrator(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Orchestrator,
            agent: None,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(agent: AgentName, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Agent,
            agent: Some(agent),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

//
// ================= Context Store =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

//
// ================= Run Phase =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunPhase {
    Init,
    Retrieving,
    Dispatching,
    Merging,
    Finalizing,
    Done,
    Error,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Error)
    }

    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        use RunPhase::*;

        if self.is_terminal() {
            return false;
        }

        matches!(
            (self, next),
            (_, Error)
                | (Init, Retrieving)
                | (Init, Finalizing)
                | (Retrieving, Dispatching)
                | (Dispatching, Merging)
                | (Dispatching, Finalizing)
                | (Merging, Dispatching)
                | (Merging, Finalizing)
                | (Finalizing, Done)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Init => "INIT",
            RunPhase::Retrieving => "RETRIEVING",
            RunPhase::Dispatching => "DISPATCHING",
            RunPhase::Merging => "MERGING",
            RunPhase::Finalizing => "FINALIZING",
            RunPhase::Done => "DONE",
            RunPhase::Error => "ERROR",
        };
        f.write_str(s)
    }
}

//
// ================= Entry Points =================
//

/// Query entry point payload: either a question or a content-only payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub payload_ref: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

impl QueryRequest {
    pub fn question(question: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            question: Some(question.into()),
            source_type,
            ..Default::default()
        }
    }

    pub fn payload(payload_ref: impl Into<String>, source_type: SourceType, metadata: Metadata) -> Self {
        Self {
            source_type,
            payload_ref: Some(payload_ref.into()),
            metadata,
            ..Default::default()
        }
    }
}

/// Ingestion entry point payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    pub texts: Vec<String>,
    #[serde(default)]
    pub metadatas: Option<Vec<Metadata>>,
}

//
// ================= TwinState =================
//

/// Key under which the per-run retrieval result is stored in `context`.
pub const RETRIEVED_DOCS: &str = "retrieved_docs";

/// Shared state threaded through one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwinState {
    pub run_id: Uuid,
    pub question: Option<String>,
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub priority: Priority,
    pub payload_ref: Option<String>,
    pub metadata: Metadata,
    context: BTreeMap<String, Vec<DocumentChunk>>,
    pub retrieval_available: bool,
    agent_outputs: BTreeMap<AgentName, AgentOutput>,
    message_history: Vec<Message>,
    pub next_agent: Option<AgentName>,
    final_answer: Option<String>,
    phase: RunPhase,
    pub redispatch_count: u32,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TwinState {
    /// Build the initial state, enforcing question/payload exclusivity.
    pub fn from_request(request: QueryRequest) -> Result<Self> {
        let question = non_blank(request.question);
        let payload_ref = non_blank(request.payload_ref);

        match (&question, &payload_ref) {
            (Some(_), Some(_)) => {
                return Err(OrchestrationError::ValidationError(
                    "request carries both 'question' and 'payload_ref'; send exactly one".to_string(),
                ))
            }
            (None, None) => {
                return Err(OrchestrationError::ValidationError(
                    "request carries neither 'question' nor 'payload_ref'; send exactly one".to_string(),
                ))
            }
            _ => {}
        }

        Ok(Self {
            run_id: Uuid::new_v4(),
            question,
            source_type: request.source_type,
            source_id: request.source_id,
            priority: request.priority,
            payload_ref,
            metadata: request.metadata,
            context: BTreeMap::new(),
            retrieval_available: false,
            agent_outputs: BTreeMap::new(),
            message_history: Vec::new(),
            next_agent: None,
            final_answer: None,
            phase: RunPhase::Init,
            redispatch_count: 0,
            errors: Vec::new(),
            created_at: Utc::now(),
        })
    }

    pub fn is_content_only(&self) -> bool {
        self.payload_ref.is_some()
    }

    pub fn question_text(&self) -> &str {
        self.question.as_deref().unwrap_or_default()
    }

    // ---------- phase ----------

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Move to `next`. An illegal move parks the run in `Error`.
    pub fn transition(&mut self, next: RunPhase) -> Result<()> {
        let from = self.phase;
        if !from.can_transition_to(next) {
            if !from.is_terminal() {
                self.phase = RunPhase::Error;
            }
            return Err(OrchestrationError::InvalidTransition { from, to: next });
        }
        self.phase = next;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.errors.push(reason.into());
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Error;
        }
    }

    // ---------- context ----------

    /// Attach retrieved chunks under `key`. Existing keys are never replaced.
    pub fn attach_context(&mut self, key: impl Into<String>, chunks: Vec<DocumentChunk>) -> bool {
        use std::collections::btree_map::Entry;

        match self.context.entry(key.into()) {
            Entry::Vacant(slot) => {
                slot.insert(chunks);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn context(&self) -> &BTreeMap<String, Vec<DocumentChunk>> {
        &self.context
    }

    /// All retrieved chunks, in key order.
    pub fn context_chunks(&self) -> Vec<DocumentChunk> {
        self.context.values().flatten().cloned().collect()
    }

    // ---------- agent outputs ----------

    /// Record an output. Entries are write-once; returns false for a
    /// duplicate agent.
    pub fn record_output(&mut self, output: AgentOutput) -> bool {
        use std::collections::btree_map::Entry;

        match self.agent_outputs.entry(output.agent) {
            Entry::Vacant(slot) => {
                slot.insert(output);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn agent_outputs(&self) -> &BTreeMap<AgentName, AgentOutput> {
        &self.agent_outputs
    }

    pub fn output(&self, agent: AgentName) -> Option<&AgentOutput> {
        self.agent_outputs.get(&agent)
    }

    // ---------- history ----------

    pub fn push_message(&mut self, message: Message) {
        self.message_history.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.message_history
    }

    // ---------- final answer ----------

    pub fn set_final_answer(&mut self, answer: String) -> Result<()> {
        if self.final_answer.is_some() {
            return Err(OrchestrationError::ValidationError(format!(
                "final answer for run {} is already set",
                self.run_id
            )));
        }
        self.final_answer = Some(answer);
        Ok(())
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }
}
