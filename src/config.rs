//! Orchestrator configuration
//!
//! Every behaviour switch lives in one explicit struct that is handed to
//! the builder. Core logic never reads the environment; only
//! [`OrchestratorConfig::from_env`] does, and only the binary calls it.

use crate::error::OrchestrationError;
use crate::models::AgentName;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// One designated agent answers directly, no merge phase.
    Simple,
    #[default]
    MultiAgent,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    #[default]
    Concurrent,
    Sequential,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Local feature-hashing embedder, no network.
    #[default]
    Hashed,
    /// text-embeddings-inference server hosting a HuggingFace model.
    Hf,
    OpenAi,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationBackend {
    #[default]
    None,
    OpenAi,
    Gemini,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    #[default]
    Off,
    Keyword,
}

fn parse_enum<T>(key: &str, value: &str, table: &[(&str, T)]) -> Result<T>
where
    T: Copy,
{
    let lowered = value.trim().to_lowercase();
    table
        .iter()
        .find(|(name, _)| *name == lowered)
        .map(|(_, v)| *v)
        .ok_or_else(|| {
            OrchestrationError::ConfigError(format!("{} has unsupported value '{}'", key, value))
        })
}

impl FromStr for RunMode {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum(
            "mode",
            s,
            &[
                ("simple", RunMode::Simple),
                ("direct", RunMode::Simple),
                ("multi_agent", RunMode::MultiAgent),
                ("multi", RunMode::MultiAgent),
            ],
        )
    }
}

impl FromStr for DispatchStrategy {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum(
            "dispatch",
            s,
            &[
                ("concurrent", DispatchStrategy::Concurrent),
                ("sequential", DispatchStrategy::Sequential),
            ],
        )
    }
}

impl FromStr for EmbeddingBackend {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum(
            "embedding_backend",
            s,
            &[
                ("hashed", EmbeddingBackend::Hashed),
                ("local", EmbeddingBackend::Hashed),
                ("hf", EmbeddingBackend::Hf),
                ("openai", EmbeddingBackend::OpenAi),
            ],
        )
    }
}

impl FromStr for GenerationBackend {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum(
            "generation_backend",
            s,
            &[
                ("none", GenerationBackend::None),
                ("openai", GenerationBackend::OpenAi),
                ("gemini", GenerationBackend::Gemini),
            ],
        )
    }
}

impl FromStr for RoutingPolicy {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum(
            "dynamic_routing",
            s,
            &[
                ("off", RoutingPolicy::Off),
                ("none", RoutingPolicy::Off),
                ("keyword", RoutingPolicy::Keyword),
            ],
        )
    }
}

/// Embedding backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Vector width for the hashed embedder.
    pub dimensions: usize,
    pub hf_endpoint: String,
    pub openai_base_url: String,
    pub openai_model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hashed,
            dimensions: 384,
            hf_endpoint: "http://127.0.0.1:8080".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "text-embedding-3-large".to_string(),
            api_key: None,
        }
    }
}

/// Language-generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub backend: GenerationBackend,
    pub openai_base_url: String,
    pub openai_model: String,
    pub temperature: f32,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub mode: RunMode,
    pub dispatch: DispatchStrategy,
    /// Agent that answers in simple mode.
    pub simple_agent: AgentName,
    /// Explicit agent roster for multi-agent mode. `None` selects agents
    /// from the request's source type.
    pub agents: Option<Vec<AgentName>>,
    pub archive_on_finalize: bool,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    /// Directory of the persistent context store. `None` leaves the
    /// orchestrator without a store.
    pub store_dir: Option<PathBuf>,
    pub top_k: usize,
    /// Restrict retrieval to chunks tagged with the request's source type.
    pub filter_by_source_type: bool,
    /// Chunk window, in whitespace tokens.
    pub chunk_window: usize,
    pub chunk_overlap: usize,
    pub dynamic_routing: RoutingPolicy,
    pub max_redispatch: u32,
    pub agent_timeout: Duration,
    pub generation_timeout: Duration,
    pub retrieval_timeout: Duration,
    /// Bound on post-DONE archival writes.
    pub archival_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::MultiAgent,
            dispatch: DispatchStrategy::Concurrent,
            simple_agent: AgentName::Strategy,
            agents: None,
            archive_on_finalize: true,
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            store_dir: None,
            top_k: 5,
            filter_by_source_type: false,
            chunk_window: 800,
            chunk_overlap: 120,
            dynamic_routing: RoutingPolicy::Off,
            max_redispatch: 3,
            agent_timeout: Duration::from_secs(90),
            generation_timeout: Duration::from_secs(60),
            retrieval_timeout: Duration::from_secs(15),
            archival_timeout: Duration::from_secs(30),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| OrchestrationError::ConfigError(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(None),
    }
}

fn parse_bool(key: &str) -> Result<Option<bool>> {
    match var(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(OrchestrationError::ConfigError(format!(
                "{} has invalid boolean '{}'",
                key, raw
            ))),
        },
        None => Ok(None),
    }
}

impl OrchestratorConfig {
    /// Load configuration from `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Some(mode) = var("TWIN_MODE") {
            config.mode = mode.parse()?;
        }
        if let Some(dispatch) = var("TWIN_DISPATCH") {
            config.dispatch = dispatch.parse()?;
        }
        if let Some(agent) = var("TWIN_SIMPLE_AGENT") {
            config.simple_agent = agent.parse()?;
        }
        if let Some(list) = var("TWIN_AGENTS") {
            let agents = list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<AgentName>>>()?;
            config.agents = Some(agents);
        }
        if let Some(archive) = parse_bool("TWIN_ARCHIVE_ON_FINALIZE")? {
            config.archive_on_finalize = archive;
        }

        if let Some(backend) = var("EMBEDDING_BACKEND") {
            config.embedding.backend = backend.parse()?;
        }
        if let Some(dims) = parse_var("EMBEDDING_DIMENSIONS")? {
            config.embedding.dimensions = dims;
        }
        if let Some(endpoint) = var("HF_EMBED_ENDPOINT") {
            config.embedding.hf_endpoint = endpoint;
        }
        if let Some(model) = var("OPENAI_EMBED_MODEL") {
            config.embedding.openai_model = model;
        }

        if let Some(backend) = var("GENERATION_BACKEND") {
            config.generation.backend = backend.parse()?;
        }
        if let Some(model) = var("OPENAI_CHAT_MODEL") {
            config.generation.openai_model = model;
        }
        if let Some(base) = var("OPENAI_BASE_URL") {
            config.embedding.openai_base_url = base.clone();
            config.generation.openai_base_url = base;
        }

        let openai_key = var("OPENAI_API_KEY");
        config.embedding.api_key = openai_key.clone();
        config.generation.api_key = match config.generation.backend {
            GenerationBackend::Gemini => var("GEMINI_API_KEY"),
            _ => openai_key,
        };

        config.store_dir = var("VECTOR_STORE_DIR")
            .or_else(|| var("VECTORSTORE_DIR"))
            .map(PathBuf::from);

        if let Some(top_k) = parse_var("TWIN_TOP_K")? {
            config.top_k = top_k;
        }
        if let Some(filter) = parse_bool("TWIN_FILTER_BY_SOURCE_TYPE")? {
            config.filter_by_source_type = filter;
        }
        if let Some(window) = parse_var("TWIN_CHUNK_WINDOW")? {
            config.chunk_window = window;
        }
        if let Some(overlap) = parse_var("TWIN_CHUNK_OVERLAP")? {
            config.chunk_overlap = overlap;
        }
        if let Some(routing) = var("TWIN_DYNAMIC_ROUTING") {
            config.dynamic_routing = routing.parse()?;
        }
        if let Some(max) = parse_var("TWIN_MAX_REDISPATCH")? {
            config.max_redispatch = max;
        }
        if let Some(secs) = parse_var::<u64>("TWIN_AGENT_TIMEOUT_SECS")? {
            config.agent_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("TWIN_GENERATION_TIMEOUT_SECS")? {
            config.generation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("TWIN_RETRIEVAL_TIMEOUT_SECS")? {
            config.retrieval_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("TWIN_ARCHIVAL_TIMEOUT_SECS")? {
            config.archival_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(OrchestrationError::ConfigError(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.chunk_window == 0 {
            return Err(OrchestrationError::ConfigError(
                "chunk_window must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_window {
            return Err(OrchestrationError::ConfigError(format!(
                "chunk_overlap ({}) must be smaller than chunk_window ({})",
                self.chunk_overlap, self.chunk_window
            )));
        }
        if self.embedding.dimensions == 0 {
            return Err(OrchestrationError::ConfigError(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        if let Some(agents) = &self.agents {
            if agents.is_empty() {
                return Err(OrchestrationError::ConfigError(
                    "explicit agent roster is empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_window, 800);
        assert_eq!(config.chunk_overlap, 120);
        assert!(config.archive_on_finalize);
        assert_eq!(config.mode, RunMode::MultiAgent);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let config = OrchestratorConfig {
            chunk_window: 100,
            chunk_overlap: 100,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(OrchestrationError::ConfigError(_))
        ));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("simple".parse::<RunMode>().unwrap(), RunMode::Simple);
        assert_eq!("multi_agent".parse::<RunMode>().unwrap(), RunMode::MultiAgent);
        assert_eq!("HF".parse::<EmbeddingBackend>().unwrap(), EmbeddingBackend::Hf);
        assert_eq!(
            "openai".parse::<EmbeddingBackend>().unwrap(),
            EmbeddingBackend::OpenAi
        );
        assert!("faiss".parse::<EmbeddingBackend>().is_err());
        assert_eq!("keyword".parse::<RoutingPolicy>().unwrap(), RoutingPolicy::Keyword);
    }

    #[test]
    fn test_api_keys_are_not_serialized() {
        let mut config = OrchestratorConfig::default();
        config.generation.api_key = Some("sk-secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
