// src/llm/ollama.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{non_empty, send_with_retry, LanguageModel, LlmError, ResponseFormat, SYSTEM_PROMPT};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: [Message<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

/// Local Ollama server; no API key.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

fn parse_reply(body: &str) -> Result<String, LlmError> {
    let reply: ChatResponse = serde_json::from_str(body)?;
    non_empty(reply.message.as_ref().map(|m| m.content.as_str()))
}

#[async_trait]
impl LanguageModel for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str, format: ResponseFormat) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            stream: false,
            messages: [
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            format: (format == ResponseFormat::Json).then_some("json"),
        };
        let url = format!("{}/api/chat", self.base_url);
        let raw = send_with_retry(|| self.client.post(&url).json(&body)).await?;
        let text = parse_reply(&raw)?;
        info!("Successfully retrieved Ollama response");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply() {
        let body = r#"{"model":"mistral","message":{"role":"assistant","content":"{\"match_score\": 70}"},"done":true}"#;
        assert_eq!(parse_reply(body).unwrap(), "{\"match_score\": 70}");
        assert!(matches!(parse_reply(r#"{"done":true}"#), Err(LlmError::EmptyContent)));
    }
}
