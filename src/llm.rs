use crate::error::{AgentError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

lazy_static! {
    /// Control tokens some chat models leak into their output, e.g. `<|eot_id|>`.
    static ref MARKER_TOKEN: Regex = Regex::new(r"<\|.*?\|>|\[/?INST\]").unwrap();
}

/// Narrow seam over the text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub fn strip_markers(text: &str) -> String {
    MARKER_TOKEN.replace_all(text, "").trim().to_string()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Client for an Ollama-style `/api/chat` endpoint.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl LlmClient {
    pub fn new(url: String, model: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, url, model })
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "system",
                content: prompt,
            }],
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        };

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::GenerationUnavailable(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "generation service returned an error status");
            return Err(AgentError::GenerationUnavailable(format!(
                "LLM API returned {}",
                status
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            AgentError::GenerationUnavailable(format!("Failed to parse LLM response: {}", e))
        })?;

        debug!(chars = parsed.message.content.len(), "generation complete");
        Ok(strip_markers(&parsed.message.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markers() {
        assert_eq!(strip_markers("<|start_header_id|>55, 104<|eot_id|>"), "55, 104");
        assert_eq!(strip_markers("[INST] 19 [/INST]"), "19");
        assert_eq!(strip_markers("plain"), "plain");
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "llama3.2:1b",
            messages: vec![ChatMessage {
                role: "system",
                content: "hi",
            }],
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], serde_json::json!(false));
        assert_eq!(json["options"]["temperature"], serde_json::json!(0.0));
        assert_eq!(json["messages"][0]["role"], "system");
    }
}
