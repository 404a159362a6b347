//! Ephemeral context store, used in tests and as a scratch index.

use super::{embed_batch, validate_batch, validate_k, ChunkIndex, ContextStore};
use crate::embedding::Embedder;
use crate::models::{Metadata, ScoredChunk};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub struct InMemoryStore {
    embedder: Arc<dyn Embedder>,
    index: RwLock<ChunkIndex>,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            index: RwLock::new(ChunkIndex::default()),
        }
    }
}

#[async_trait]
impl ContextStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn add_texts(
        &self,
        texts: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<Vec<String>> {
        validate_batch(&texts, metadatas.as_ref())?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = embed_batch(self.embedder.as_ref(), &texts).await?;

        let mut index = self.index.write().await;
        let chunks = index.prepare(texts, metadatas, embeddings);
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        index.extend(chunks);

        debug!(added = ids.len(), total = index.len(), "In-memory store appended");
        Ok(ids)
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<ScoredChunk>> {
        validate_k(k)?;
        if self.index.read().await.len() == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embed_batch(self.embedder.as_ref(), &[query.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        let index = self.index.read().await;
        Ok(index.search(&query_vec, k, filter))
    }

    async fn len(&self) -> usize {
        self.index.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use crate::error::OrchestrationError;
    use serde_json::json;

    fn store() -> InMemoryStore {
        InMemoryStore::new(Arc::new(HashedEmbedder::new(384)))
    }

    fn internal() -> Metadata {
        let mut m = Metadata::new();
        m.insert("source_type".into(), json!("internal"));
        m
    }

    #[tokio::test]
    async fn test_revenue_projection_is_top_hit() {
        let store = store();
        let ids = store
            .add_texts(
                vec!["Revenue projection: $2M Year 1".to_string()],
                Some(vec![internal()]),
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);

        let hits = store.similarity_search("revenue projection", 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, ids[0]);
        assert_eq!(hits[0].chunk.text, "Revenue projection: $2M Year 1");
        assert_eq!(hits[0].chunk.metadata["source_type"], "internal");
    }

    #[tokio::test]
    async fn test_empty_store_returns_no_hits() {
        let hits = store().similarity_search("anything", 3, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_filter_excludes_other_sources() {
        let store = store();
        store
            .add_texts(vec!["CAPEX estimate 40M".into()], Some(vec![internal()]))
            .await
            .unwrap();

        let mut public = Metadata::new();
        public.insert("source_type".into(), json!("public"));
        let hits = store
            .similarity_search("capex estimate", 5, Some(&public))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_mismatched_metadata() {
        let err = store()
            .add_texts(vec!["a".into(), "b".into()], Some(vec![internal()]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_append_only_under_concurrency() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .add_texts(vec![format!("run {} memo", i)], None)
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for h in handles {
            ids.extend(h.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(store.len().await, 8);
    }

    #[tokio::test]
    async fn test_zero_k_is_rejected() {
        assert!(store().similarity_search("q", 0, None).await.is_err());
    }
}
