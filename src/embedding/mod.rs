//! Embedding capability
//!
//! The context store and retrieval gateway depend on an [`Embedder`] but
//! never pick one; the builder resolves the backend once from
//! configuration.

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod hashed;
pub mod http;

pub use hashed::HashedEmbedder;
pub use http::{HfEmbedder, OpenAiEmbedder};

/// Turns texts into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            OrchestrationError::EmbeddingError(format!("{} returned no vector for query", self.name()))
        })
    }
}

/// Build the configured embedder.
pub fn create_embedder(config: &EmbeddingConfig, timeout: Duration) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.backend {
        EmbeddingBackend::Hashed => Arc::new(HashedEmbedder::new(config.dimensions)),
        EmbeddingBackend::Hf => Arc::new(HfEmbedder::new(config.hf_endpoint.clone(), timeout)?),
        EmbeddingBackend::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                OrchestrationError::ConfigError(
                    "OPENAI_API_KEY is required for the openai embedding backend".to_string(),
                )
            })?;
            Arc::new(OpenAiEmbedder::new(
                config.openai_base_url.clone(),
                config.openai_model.clone(),
                api_key,
                timeout,
            )?)
        }
    };

    info!(embedder = embedder.name(), "Embedding backend selected");
    Ok(embedder)
}

/// Cosine similarity; zero-length or zero-norm vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
