//! HTTP embedding backends
//!
//! Both clients hold a long-lived `reqwest::Client` for connection pooling
//! and bound every request by the configured timeout.

use super::Embedder;
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .timeout(timeout)
        .build()
        .map_err(OrchestrationError::from)
}

fn check_count(backend: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(OrchestrationError::EmbeddingError(format!(
            "{} returned {} vectors for {} inputs",
            backend, got, expected
        )));
    }
    Ok(())
}

//
// ================= text-embeddings-inference =================
//

/// Client for a HuggingFace text-embeddings-inference server.
pub struct HfEmbedder {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct HfRequest<'a> {
    inputs: &'a [String],
    normalize: bool,
}

impl HfEmbedder {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Embedder for HfEmbedder {
    fn name(&self) -> &str {
        "hf"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embed", self.endpoint);
        debug!(count = texts.len(), "Calling text-embeddings-inference");

        let response = self
            .client
            .post(&url)
            .json(&HfRequest {
                inputs: texts,
                normalize: true,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Embedding request failed: {}", e);
                OrchestrationError::EmbeddingError(format!("hf request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::EmbeddingError(format!(
                "hf returned {}: {}",
                status, body
            )));
        }

        let vectors: Vec<Vec<f32>> = response.json().await.map_err(|e| {
            OrchestrationError::EmbeddingError(format!("hf parse error: {}", e))
        })?;

        check_count("hf", texts.len(), vectors.len())?;
        Ok(vectors)
    }
}

//
// ================= OpenAI =================
//

pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(base_url: String, model: String, api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        debug!(count = texts.len(), model = %self.model, "Calling OpenAI embeddings");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&OpenAiRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Embedding request failed: {}", e);
                OrchestrationError::EmbeddingError(format!("openai request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::EmbeddingError(format!(
                "openai returned {}: {}",
                status, body
            )));
        }

        let mut parsed: OpenAiResponse = response.json().await.map_err(|e| {
            OrchestrationError::EmbeddingError(format!("openai parse error: {}", e))
        })?;

        check_count("openai", texts.len(), parsed.data.len())?;
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hf_request_shape() {
        let inputs = vec!["capex".to_string()];
        let json = serde_json::to_value(HfRequest {
            inputs: &inputs,
            normalize: true,
        })
        .unwrap();
        assert_eq!(json["inputs"][0], "capex");
    }

    #[test]
    fn test_openai_response_parsing() {
        let raw = r#"{"data":[{"index":1,"embedding":[0.5]},{"index":0,"embedding":[0.1]}]}"#;
        let mut parsed: OpenAiResponse = serde_json::from_str(raw).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![0.1]);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_network() {
        let embedder = HfEmbedder::new("http://127.0.0.1:1".into(), Duration::from_millis(50)).unwrap();
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }
}
