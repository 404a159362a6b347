//! Context Store
//!
//! Append-only, similarity-searchable index of text chunks. Chunks are
//! immutable once stored; re-ingesting text creates new chunks.

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::OrchestrationError;
use crate::models::{DocumentChunk, Metadata, ScoredChunk};
use crate::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

pub mod chunking;
pub mod directory;
pub mod memory;

pub use chunking::TextSplitter;
pub use directory::DirectoryStore;
pub use memory::InMemoryStore;

/// Trait for context store backends
#[async_trait]
pub trait ContextStore: Send + Sync {
    fn name(&self) -> &str;

    /// False while the backing index is missing or uninitialized.
    async fn is_available(&self) -> bool;

    /// Embed and append `texts`, returning one chunk id per text.
    async fn add_texts(
        &self,
        texts: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<Vec<String>>;

    /// Top-`k` chunks by descending cosine similarity, ties broken by
    /// insertion order.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<ScoredChunk>>;

    async fn len(&self) -> usize;
}

/// Reject batches whose metadata list does not line up with the texts.
pub(crate) fn validate_batch(texts: &[String], metadatas: Option<&Vec<Metadata>>) -> Result<()> {
    if let Some(metas) = metadatas {
        if metas.len() != texts.len() {
            return Err(OrchestrationError::ValidationError(format!(
                "{} metadata entries supplied for {} texts",
                metas.len(),
                texts.len()
            )));
        }
    }
    Ok(())
}

pub(crate) fn validate_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(OrchestrationError::ValidationError(
            "similarity search requires k > 0".to_string(),
        ));
    }
    Ok(())
}

/// Embed a batch outside any store lock.
pub(crate) async fn embed_batch(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let vectors = embedder.embed(texts).await.map_err(|e| {
        OrchestrationError::StoreUnavailable(format!("embedding via {} failed: {}", embedder.name(), e))
    })?;

    if vectors.len() != texts.len() {
        return Err(OrchestrationError::StoreUnavailable(format!(
            "{} produced {} vectors for {} texts",
            embedder.name(),
            vectors.len(),
            texts.len()
        )));
    }
    Ok(vectors)
}

/// Content hash prefix plus store sequence number.
pub fn chunk_id(text: &str, sequence: usize) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let hex = hex::encode(digest);
    format!("{}-{:08}", &hex[..16], sequence)
}

/// True when every filter entry is present in `metadata` with an equal value.
pub fn matches_filter(metadata: &Metadata, filter: Option<&Metadata>) -> bool {
    match filter {
        None => true,
        Some(filter) => filter
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected)),
    }
}

/// In-memory chunk list shared by every backend.
#[derive(Debug, Default)]
pub(crate) struct ChunkIndex {
    chunks: Vec<DocumentChunk>,
}

impl ChunkIndex {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Build chunks for an embedded batch, numbering from the current length.
    pub fn prepare(
        &self,
        texts: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
        embeddings: Vec<Vec<f32>>,
    ) -> Vec<DocumentChunk> {
        let base = self.chunks.len();
        let mut metadatas = metadatas.map(|m| m.into_iter());

        texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(offset, (text, embedding))| {
                let metadata = metadatas
                    .as_mut()
                    .and_then(|it| it.next())
                    .unwrap_or_default();
                DocumentChunk {
                    id: chunk_id(&text, base + offset),
                    text,
                    embedding,
                    metadata,
                }
            })
            .collect()
    }

    pub fn extend(&mut self, chunks: Vec<DocumentChunk>) {
        self.chunks.extend(chunks);
    }

    pub fn search(&self, query: &[f32], k: usize, filter: Option<&Metadata>) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| matches_filter(&chunk.metadata, filter))
            .map(|(idx, chunk)| {
                let score = cosine_similarity(query, &chunk.embedding);
                (idx, if score.is_nan() { 0.0 } else { score })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .take(k)
            .map(|(idx, score)| ScoredChunk {
                chunk: self.chunks[idx].clone(),
                score,
            })
            .collect()
    }
}
