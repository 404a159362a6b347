//! Directory-backed persistent context store.
//!
//! Layout under the configured directory:
//! - `chunks.jsonl`: one serialized chunk per line, append-only
//! - `manifest.json`: embedder name, vector width and chunk count
//!
//! A store opened on a missing directory is uninitialized: searches fail
//! with `StoreUnavailable` until the first `add_texts` creates it.

use super::{embed_batch, validate_batch, validate_k, ChunkIndex, ContextStore};
use crate::embedding::Embedder;
use crate::error::OrchestrationError;
use crate::models::{DocumentChunk, Metadata, ScoredChunk};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const CHUNKS_FILE: &str = "chunks.jsonl";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    pub embedder: String,
    pub dimensions: Option<usize>,
    pub chunk_count: usize,
    pub updated_at: DateTime<Utc>,
}

struct DirectoryState {
    index: ChunkIndex,
    initialized: bool,
    dimensions: Option<usize>,
}

pub struct DirectoryStore {
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    state: RwLock<DirectoryState>,
}

fn unavailable(dir: &Path, what: &str, e: impl std::fmt::Display) -> OrchestrationError {
    OrchestrationError::StoreUnavailable(format!("{} {}: {}", what, dir.display(), e))
}

impl DirectoryStore {
    /// Open the store at `dir`, loading any chunks already persisted.
    pub async fn open(dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dir = dir.into();
        let mut state = DirectoryState {
            index: ChunkIndex::default(),
            initialized: false,
            dimensions: None,
        };

        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {
                let chunks = load_chunks(&dir.join(CHUNKS_FILE)).await?;
                state.dimensions = chunks.first().map(|c| c.embedding.len());
                state.index.extend(chunks);
                state.initialized = true;

                if let Some(manifest) = load_manifest(&dir.join(MANIFEST_FILE)).await {
                    if manifest.embedder != embedder.name() {
                        warn!(
                            stored = %manifest.embedder,
                            configured = embedder.name(),
                            "Context store was built with a different embedder"
                        );
                    }
                }

                info!(
                    dir = %dir.display(),
                    chunks = state.index.len(),
                    "Context store loaded"
                );
            }
            Ok(_) => {
                return Err(unavailable(&dir, "store path is not a directory", "exists as file"));
            }
            Err(_) => {
                debug!(dir = %dir.display(), "Context store directory absent; uninitialized");
            }
        }

        Ok(Self {
            dir,
            embedder,
            state: RwLock::new(state),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn append(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let mut buf = Vec::new();
        for chunk in chunks {
            serde_json::to_writer(&mut buf, chunk)?;
            buf.push(b'\n');
        }

        let path = self.dir.join(CHUNKS_FILE);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| unavailable(&path, "cannot open", e))?;
        let committed = file
            .metadata()
            .await
            .map_err(|e| unavailable(&path, "cannot stat", e))?
            .len();

        let written = async {
            file.write_all(&buf).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            // A torn line would let the next batch reuse these sequence numbers.
            rollback(&mut file, &path, committed).await;
            return Err(unavailable(&path, "cannot append to", e));
        }
        Ok(())
    }

    async fn write_manifest(&self, chunk_count: usize, dimensions: Option<usize>) -> Result<()> {
        let manifest = StoreManifest {
            embedder: self.embedder.name().to_string(),
            dimensions,
            chunk_count,
            updated_at: Utc::now(),
        };
        let body = serde_json::to_vec_pretty(&manifest)?;
        tokio::fs::write(self.dir.join(MANIFEST_FILE), body).await?;
        Ok(())
    }
}

/// Truncate `file` back to `len` bytes after a failed append.
async fn rollback(file: &mut tokio::fs::File, path: &Path, len: u64) {
    if let Err(e) = file.set_len(len).await {
        warn!(path = %path.display(), error = %e, "Failed to roll back partial append");
    }
}

async fn load_chunks(path: &Path) -> Result<Vec<DocumentChunk>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(unavailable(path, "cannot read", e)),
    };

    let mut chunks = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DocumentChunk>(line) {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => warn!(
                path = %path.display(),
                line = line_no + 1,
                error = %e,
                "Skipping malformed chunk record"
            ),
        }
    }
    Ok(chunks)
}

async fn load_manifest(path: &Path) -> Option<StoreManifest> {
    let raw = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&raw).ok()
}

#[async_trait]
impl ContextStore for DirectoryStore {
    fn name(&self) -> &str {
        "directory"
    }

    async fn is_available(&self) -> bool {
        self.state.read().await.initialized
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

        let mut state = self.state.write().await;
        if !state.initialized {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(|e| unavailable(&self.dir, "cannot create store directory", e))?;
            state.initialized = true;
            info!(dir = %self.dir.display(), "Context store created");
        }

        let chunks = state.index.prepare(texts, metadatas, embeddings);
        self.append(&chunks).await?;

        if state.dimensions.is_none() {
            state.dimensions = chunks.first().map(|c| c.embedding.len());
        }
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        state.index.extend(chunks);

        if let Err(e) = self.write_manifest(state.index.len(), state.dimensions).await {
            warn!(error = %e, "Failed to refresh store manifest");
        }

        debug!(added = ids.len(), total = state.index.len(), "Directory store appended");
        Ok(ids)
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<ScoredChunk>> {
        validate_k(k)?;
        {
            let state = self.state.read().await;
            if !state.initialized {
                return Err(OrchestrationError::StoreUnavailable(format!(
                    "store at {} is not initialized",
                    self.dir.display()
                )));
            }
            if state.index.len() == 0 {
                return Ok(Vec::new());
            }
        }

        let query_vec = embed_batch(self.embedder.as_ref(), &[query.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        let state = self.state.read().await;
        Ok(state.index.search(&query_vec, k, filter))
    }

    async fn len(&self) -> usize {
        self.state.read().await.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashedEmbedder::new(128))
    }

    #[tokio::test]
    async fn test_missing_directory_is_uninitialized() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(tmp.path().join("vector_store"), embedder())
            .await
            .unwrap();

        assert!(!store.is_available().await);
        let err = store.similarity_search("capex", 3, None).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_first_write_creates_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("vector_store");

        let ids = {
            let store = DirectoryStore::open(&dir, embedder()).await.unwrap();
            let ids = store
                .add_texts(
                    vec!["Revenue projection: $2M Year 1".into(), "Harbour permits".into()],
                    None,
                )
                .await
                .unwrap();
            assert!(store.is_available().await);
            ids
        };

        let reopened = DirectoryStore::open(&dir, embedder()).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        let hits = reopened
            .similarity_search("revenue projection", 1, None)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.id, ids[0]);

        let manifest = load_manifest(&dir.join(MANIFEST_FILE)).await.unwrap();
        assert_eq!(manifest.chunk_count, 2);
        assert_eq!(manifest.embedder, "hashed");
        assert_eq!(manifest.dimensions, Some(128));
    }

    #[tokio::test]
    async fn test_ids_continue_after_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("store");

        let first = DirectoryStore::open(&dir, embedder()).await.unwrap();
        let a = first.add_texts(vec!["memo".into()], None).await.unwrap();
        drop(first);

        let second = DirectoryStore::open(&dir, embedder()).await.unwrap();
        let b = second.add_texts(vec!["memo".into()], None).await.unwrap();
        assert_ne!(a[0], b[0]);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();
        tokio::fs::write(dir.join(CHUNKS_FILE), "not json\n").await.unwrap();

        let store = DirectoryStore::open(&dir, embedder()).await.unwrap();
        assert!(store.is_available().await);
        assert_eq!(store.len().await, 0);
        assert!(store.similarity_search("x", 1, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_path_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not_a_dir");
        tokio::fs::write(&file, "x").await.unwrap();
        let result = DirectoryStore::open(&file, embedder()).await;
        assert!(matches!(result, Err(OrchestrationError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_rollback_discards_torn_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CHUNKS_FILE);
        tokio::fs::write(&path, "{\"id\":\"a\"}\n").await.unwrap();

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap();
        let committed = file.metadata().await.unwrap().len();
        file.write_all(b"{\"id\":\"torn").await.unwrap();
        file.flush().await.unwrap();

        rollback(&mut file, &path, committed).await;
        drop(file);

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(raw, "{\"id\":\"a\"}\n");
    }
}
