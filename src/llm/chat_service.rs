// src/llm/chat_service.rs
//! Self-hosted chat service: POST `{"prompt"}`, reply `{"response"}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{non_empty, send_with_retry, LanguageModel, LlmError, ResponseFormat};

#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    response: Option<String>,
}

pub struct ChatServiceClient {
    client: reqwest::Client,
    url: String,
}

impl ChatServiceClient {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(100))
                .build()
                .unwrap_or_default(),
            url,
        }
    }
}

fn parse_reply(body: &str) -> Result<String, LlmError> {
    let reply: AskResponse = serde_json::from_str(body)?;
    non_empty(reply.response.as_deref()).inspect_err(|_| {
        error!("Invalid response format from AI chat service: {}", body);
    })
}

#[async_trait]
impl LanguageModel for ChatServiceClient {
    fn name(&self) -> &str {
        "chat-service"
    }

    // The service has no output-format switch; the prompt carries the instruction.
    async fn complete(&self, prompt: &str, _format: ResponseFormat) -> Result<String, LlmError> {
        let body = AskRequest { prompt };
        let raw = send_with_retry(|| self.client.post(&self.url).json(&body)).await?;
        let text = parse_reply(&raw)?;
        info!("Successfully retrieved response from AI chat service");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply(r#"{"response": "ok"}"#).unwrap(), "ok");
        assert!(matches!(parse_reply(r#"{"other": 1}"#), Err(LlmError::EmptyContent)));
        assert!(matches!(parse_reply("not json"), Err(LlmError::Parse(_))));
    }
}
