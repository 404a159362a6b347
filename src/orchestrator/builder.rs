//! Orchestrator construction
//!
//! Resolves every capability once, from the configuration, unless the
//! caller injects its own.

use super::routing::{KeywordRouter, NoRouting, Router};
use super::Orchestrator;
use crate::agents::AgentRegistry;
use crate::archive::ArchivalSink;
use crate::audit::RunLedger;
use crate::config::{OrchestratorConfig, RoutingPolicy};
use crate::embedding::{create_embedder, Embedder};
use crate::generation::{create_capability, Capability};
use crate::retrieval::RetrievalGateway;
use crate::store::{ContextStore, DirectoryStore, TextSplitter};
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

use super::dispatch::Dispatcher;
use super::synthesis::Synthesizer;

pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    store: Option<Arc<dyn ContextStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    capability: Option<Capability>,
    registry: Option<AgentRegistry>,
    router: Option<Arc<dyn Router>>,
    ledger: Option<Arc<RunLedger>>,
}

impl OrchestratorBuilder {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            store: None,
            embedder: None,
            capability: None,
            registry: None,
            router: None,
            ledger: None,
        }
    }

    /// Use `store` instead of opening `config.store_dir`.
    pub fn with_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<RunLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub async fn build(self) -> Result<Orchestrator> {
        let config = self.config;
        config.validate()?;

        let store = match self.store {
            Some(store) => Some(store),
            None => match &config.store_dir {
                Some(dir) => {
                    let embedder = match self.embedder {
                        Some(e) => e,
                        None => create_embedder(&config.embedding, config.retrieval_timeout)?,
                    };
                    match DirectoryStore::open(dir.clone(), embedder).await {
                        Ok(store) => Some(Arc::new(store) as Arc<dyn ContextStore>),
                        Err(e) => {
                            warn!(dir = %dir.display(), error = %e, "Context store unusable; running without one");
                            None
                        }
                    }
                }
                None => None,
            },
        };

        let capability = match self.capability {
            Some(c) => c,
            None => create_capability(&config.generation, config.generation_timeout)?,
        };

        let registry = self.registry.unwrap_or_else(|| {
            AgentRegistry::with_specialists(capability.clone(), config.generation_timeout)
        });

        let router = self.router.unwrap_or_else(|| match config.dynamic_routing {
            RoutingPolicy::Off => Arc::new(NoRouting) as Arc<dyn Router>,
            RoutingPolicy::Keyword => Arc::new(KeywordRouter),
        });

        let splitter = TextSplitter::new(config.chunk_window, config.chunk_overlap)?;
        let archive = match (&store, config.archive_on_finalize) {
            (Some(store), true) => Some(ArchivalSink::new(Arc::clone(store), splitter)),
            _ => None,
        };

        let gateway = RetrievalGateway::new(store, config.retrieval_timeout)
            .with_source_filter(config.filter_by_source_type);

        info!(
            mode = ?config.mode,
            dispatch = ?config.dispatch,
            store = gateway.store().map(|s| s.name()).unwrap_or("none"),
            capability = capability.describe(),
            router = router.name(),
            agents = registry.len(),
            archive = archive.is_some(),
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            dispatcher: Dispatcher::new(config.dispatch, config.agent_timeout),
            synthesizer: Synthesizer::new(capability, config.generation_timeout),
            registry,
            gateway,
            router,
            archive,
            ledger: self.ledger.unwrap_or_default(),
            config,
        })
    }
}
