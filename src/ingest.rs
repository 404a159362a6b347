//! Ingestion entry point
//!
//! Forwards text batches to the context store and loads the lightweight
//! on-disk formats:
//! - `*.md`: one document per non-empty line
//! - `*.jsonl`: `{"text": ..., "metadata": {...}}` per line
//! - `*.txt`: whole file, split with the chunking policy

use crate::error::OrchestrationError;
use crate::models::{IngestRequest, Metadata};
use crate::store::{ContextStore, TextSplitter};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const INGESTIBLE: &[&str] = &["md", "jsonl", "txt"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub chunk_ids: Vec<String>,
    /// Malformed records skipped while loading.
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct JsonlRecord {
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// Documents loaded from one file, ready for `add_texts`.
#[derive(Debug, Default)]
struct Loaded {
    texts: Vec<String>,
    metadatas: Vec<Metadata>,
    skipped: usize,
}

impl Loaded {
    fn push(&mut self, text: String, meta: Metadata) {
        self.texts.push(text);
        self.metadatas.push(meta);
    }
}

pub struct Ingestor {
    store: Arc<dyn ContextStore>,
    splitter: TextSplitter,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ContextStore>, splitter: TextSplitter) -> Self {
        Self { store, splitter }
    }

    /// Forward a batch to the store unchanged.
    pub async fn ingest_texts(&self, request: IngestRequest) -> Result<Vec<String>> {
        let count = request.texts.len();
        let ids = self.store.add_texts(request.texts, request.metadatas).await?;
        info!(texts = count, store = self.store.name(), "Texts ingested");
        Ok(ids)
    }

    /// Ingest every supported file directly under `dir`.
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestReport> {
        let files = list_documents(dir).await?;
        if files.is_empty() {
            warn!(dir = %dir.display(), "No supported documents found");
        }
        self.ingest_files(&files, None).await
    }

    /// Ingest `files`, merging `extra` into every document's metadata.
    pub async fn ingest_files(&self, files: &[PathBuf], extra: Option<&Metadata>) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for path in files {
            let mut loaded = self.load(path).await?;
            report.files += 1;
            report.skipped += loaded.skipped;

            if let Some(extra) = extra {
                for meta in &mut loaded.metadatas {
                    for (k, v) in extra {
                        meta.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
            }

            if loaded.texts.is_empty() {
                continue;
            }
            let ids = self
                .store
                .add_texts(loaded.texts, Some(loaded.metadatas))
                .await?;
            info!(file = %path.display(), chunks = ids.len(), "Document ingested");
            report.chunk_ids.extend(ids);
        }

        Ok(report)
    }

    async fn load(&self, path: &Path) -> Result<Loaded> {
        let raw = tokio::fs::read_to_string(path).await?;
        let source = path.display().to_string();
        let mut loaded = Loaded::default();

        match extension(path).as_deref() {
            Some("md") => {
                for (idx, line) in raw.lines().enumerate() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    loaded.push(line.to_string(), source_meta(&source, Some(idx + 1)));
                }
            }
            Some("jsonl") => {
                for (idx, line) in raw.lines().enumerate() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JsonlRecord>(line) {
                        Ok(record) if !record.text.trim().is_empty() => {
                            let mut meta = source_meta(&source, Some(idx + 1));
                            for (k, v) in record.metadata.unwrap_or_default() {
                                meta.insert(k, v);
                            }
                            loaded.push(record.text, meta);
                        }
                        Ok(_) => loaded.skipped += 1,
                        Err(e) => {
                            warn!(file = %source, line = idx + 1, error = %e, "Malformed line skipped");
                            loaded.skipped += 1;
                        }
                    }
                }
            }
            Some("txt") => {
                for (idx, piece) in self.splitter.split(&raw).into_iter().enumerate() {
                    let mut meta = source_meta(&source, None);
                    meta.insert("chunk".into(), json!(idx));
                    loaded.push(piece, meta);
                }
            }
            _ => {
                return Err(OrchestrationError::ValidationError(format!(
                    "unsupported document type: {}",
                    source
                )))
            }
        }

        Ok(loaded)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn source_meta(source: &str, line: Option<usize>) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("source".into(), Value::String(source.to_string()));
    if let Some(line) = line {
        meta.insert("line".into(), json!(line));
    }
    meta
}

/// Supported files directly under `dir`, sorted by path.
pub async fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let supported = extension(&path)
            .map(|e| INGESTIBLE.contains(&e.as_str()))
            .unwrap_or(false);
        if supported && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use crate::store::InMemoryStore;

    fn ingestor() -> (Ingestor, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new(Arc::new(HashedEmbedder::new(256))));
        (Ingestor::new(store.clone(), TextSplitter::default()), store)
    }

    #[tokio::test]
    async fn test_ingest_texts_forwards_batch() {
        let (ingestor, store) = ingestor();
        let ids = ingestor
            .ingest_texts(IngestRequest {
                texts: vec!["Revenue projection: $2M Year 1".into()],
                metadatas: None,
            })
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_ingest_dir_loads_supported_formats() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        tokio::fs::write(dir.join("plan.md"), "# Plan\n\nCAPEX estimate: 40M EUR\n")
            .await
            .unwrap();
        tokio::fs::write(
            dir.join("facts.jsonl"),
            "{\"text\": \"Harbour permit pending\", \"metadata\": {\"source_type\": \"internal\"}}\nnot json\n",
        )
        .await
        .unwrap();
        tokio::fs::write(dir.join("notes.txt"), "Supplier onboarding in Q3").await.unwrap();
        tokio::fs::write(dir.join("deck.pdf"), "binary").await.unwrap();

        let listed = list_documents(dir).await.unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["facts.jsonl", "notes.txt", "plan.md"]);

        let (ingestor, store) = ingestor();
        let report = ingestor.ingest_dir(dir).await.unwrap();
        assert_eq!(report.files, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.chunk_ids.len(), 4);

        let hits = store.similarity_search("harbour permit", 1, None).await.unwrap();
        assert_eq!(hits[0].chunk.metadata["source_type"], "internal");
        assert_eq!(hits[0].chunk.metadata["line"], 1);
    }

    #[tokio::test]
    async fn test_extra_metadata_does_not_override() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.md");
        tokio::fs::write(&path, "Board approved the budget").await.unwrap();

        let mut extra = Metadata::new();
        extra.insert("source_type".into(), json!("master"));
        extra.insert("line".into(), json!(99));

        let (ingestor, store) = ingestor();
        ingestor.ingest_files(&[path], Some(&extra)).await.unwrap();

        let hits = store.similarity_search("budget", 1, None).await.unwrap();
        assert_eq!(hits[0].chunk.metadata["source_type"], "master");
        assert_eq!(hits[0].chunk.metadata["line"], 1);
    }
}
