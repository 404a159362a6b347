//! Retrieval Gateway
//!
//! Wraps the context store behind a query interface that never fails.
//! Missing, uninitialized, failing or slow stores all collapse into
//! `available = false` with no chunks.

use crate::models::{DocumentChunk, Metadata, SourceType};
use crate::store::ContextStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Retrieval {
    pub chunks: Vec<DocumentChunk>,
    pub available: bool,
}

impl Retrieval {
    pub fn unavailable() -> Self {
        Self {
            chunks: Vec::new(),
            available: false,
        }
    }
}

pub struct RetrievalGateway {
    store: Option<Arc<dyn ContextStore>>,
    timeout: Duration,
    filter_by_source_type: bool,
}

impl RetrievalGateway {
    pub fn new(store: Option<Arc<dyn ContextStore>>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            filter_by_source_type: false,
        }
    }

    /// Restrict results to chunks tagged with the caller's source type.
    pub fn with_source_filter(mut self, enabled: bool) -> Self {
        self.filter_by_source_type = enabled;
        self
    }

    pub fn store(&self) -> Option<&Arc<dyn ContextStore>> {
        self.store.as_ref()
    }

    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        source_type: Option<SourceType>,
    ) -> Retrieval {
        let Some(store) = &self.store else {
            debug!("No context store configured; retrieval skipped");
            return Retrieval::unavailable();
        };

        if top_k == 0 || query.trim().is_empty() {
            return Retrieval {
                chunks: Vec::new(),
                available: store.is_available().await,
            };
        }

        let filter = match source_type {
            Some(st) if self.filter_by_source_type => {
                let mut f = Metadata::new();
                f.insert("source_type".to_string(), st.as_str().into());
                Some(f)
            }
            _ => None,
        };

        let search = store.similarity_search(query, top_k, filter.as_ref());
        match tokio::time::timeout(self.timeout, search).await {
            Ok(Ok(hits)) => {
                info!(
                    store = store.name(),
                    hits = hits.len(),
                    top_score = hits.first().map(|h| h.score).unwrap_or(0.0),
                    "Context retrieved"
                );
                Retrieval {
                    chunks: hits.into_iter().map(|h| h.chunk).collect(),
                    available: true,
                }
            }
            Ok(Err(e)) => {
                warn!(store = store.name(), error = %e, "Retrieval failed; continuing without context");
                Retrieval::unavailable()
            }
            Err(_) => {
                warn!(
                    store = store.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Retrieval timed out; continuing without context"
                );
                Retrieval::unavailable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use crate::error::OrchestrationError;
    use crate::models::ScoredChunk;
    use crate::store::{DirectoryStore, InMemoryStore};
    use crate::Result;
    use async_trait::async_trait;
    use serde_json::json;

    struct StalledStore;

    #[async_trait]
    impl ContextStore for StalledStore {
        fn name(&self) -> &str {
            "stalled"
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn add_texts(&self, _: Vec<String>, _: Option<Vec<Metadata>>) -> Result<Vec<String>> {
            Err(OrchestrationError::StoreUnavailable("read only".into()))
        }
        async fn similarity_search(
            &self,
            _: &str,
            _: usize,
            _: Option<&Metadata>,
        ) -> Result<Vec<ScoredChunk>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
        async fn len(&self) -> usize {
            0
        }
    }

    fn embedder() -> Arc<HashedEmbedder> {
        Arc::new(HashedEmbedder::new(256))
    }

    #[tokio::test]
    async fn test_absent_store_is_unavailable() {
        let gateway = RetrievalGateway::new(None, Duration::from_secs(1));
        let result = gateway.retrieve("What is the CAPEX estimate?", 5, None).await;
        assert!(!result.available);
        assert!(result.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_uninitialized_store_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(tmp.path().join("missing"), embedder())
            .await
            .unwrap();
        let gateway = RetrievalGateway::new(Some(Arc::new(store)), Duration::from_secs(1));
        let result = gateway.retrieve("capex", 5, Some(SourceType::Internal)).await;
        assert!(!result.available);
        assert!(result.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let gateway = RetrievalGateway::new(Some(Arc::new(StalledStore)), Duration::from_millis(20));
        let result = gateway.retrieve("capex", 5, None).await;
        assert!(!result.available);
    }

    #[tokio::test]
    async fn test_source_filter_is_opt_in() {
        let store = Arc::new(InMemoryStore::new(embedder()));
        let mut meta = Metadata::new();
        meta.insert("source_type".into(), json!("internal"));
        store
            .add_texts(vec!["CAPEX estimate: 40M EUR".into()], Some(vec![meta]))
            .await
            .unwrap();

        let open = RetrievalGateway::new(Some(store.clone()), Duration::from_secs(1));
        let hits = open.retrieve("capex estimate", 3, Some(SourceType::Public)).await;
        assert!(hits.available);
        assert_eq!(hits.chunks.len(), 1);

        let filtered = RetrievalGateway::new(Some(store), Duration::from_secs(1)).with_source_filter(true);
        let hits = filtered
            .retrieve("capex estimate", 3, Some(SourceType::Public))
            .await;
        assert!(hits.available);
        assert!(hits.chunks.is_empty());
    }
}
