//! OpenAI-compatible chat completions client.

use super::{format_context, LanguageModel};
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const SYSTEM_PROMPT: &str = "You are a specialist analyst inside a company digital twin. \
Answer from the supplied context, flag gaps explicitly, and keep the answer structured.";

pub struct OpenAiChatClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

impl OpenAiChatClient {
    pub fn new(
        base_url: String,
        model: String,
        api_key: String,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            temperature,
        })
    }

    fn build_request(&self, prompt: &str, context: &[String]) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("{}\n\nContext:\n{}", prompt, format_context(context)),
                },
            ],
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str, context: &[String]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, passages = context.len(), "Calling chat completions");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_request(prompt, context))
            .send()
            .await
            .map_err(|e| {
                error!("Chat completion request failed: {}", e);
                OrchestrationError::GenerationError(format!("chat request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "Chat completion error response: {}", body);
            return Err(OrchestrationError::GenerationError(format!(
                "chat completions returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            OrchestrationError::GenerationError(format!("chat response parse error: {}", e))
        })?;

        first_choice(parsed)
    }
}

fn first_choice(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| OrchestrationError::GenerationError("empty chat completion".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiChatClient {
        OpenAiChatClient::new(
            "http://localhost:9999/v1/".into(),
            "gpt-4o-mini".into(),
            "sk-test".into(),
            0.1,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_request_shape() {
        let c = client();
        let json = serde_json::to_value(c.build_request("Summarize risks", &[])).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("(no retrieved context)"));
        assert_eq!(c.base_url, "http://localhost:9999/v1");
    }

    #[test]
    fn test_empty_choice_is_rejected() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"  "}}]}"#)
                .unwrap();
        assert!(first_choice(parsed).is_err());
    }
}
