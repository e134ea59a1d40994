// src/llm/openai.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{non_empty, send_with_retry, LanguageModel, LlmError, ResponseFormat, SYSTEM_PROMPT};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_TOKENS: u32 = 800;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonMode>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct JsonMode {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            api_key,
            model,
            url: OPENAI_API_URL.to_string(),
        }
    }

    fn request<'a>(&'a self, prompt: &'a str, format: ResponseFormat) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: (format == ResponseFormat::Json).then_some(JsonMode { kind: "json_object" }),
        }
    }
}

fn parse_reply(body: &str) -> Result<String, LlmError> {
    let reply: ChatResponse = serde_json::from_str(body)?;
    non_empty(
        reply
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref()),
    )
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str, format: ResponseFormat) -> Result<String, LlmError> {
        let body = self.request(prompt, format);
        debug!("Calling OpenAI model {}", self.model);
        let raw = send_with_retry(|| {
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        let text = parse_reply(&raw)?;
        info!("Successfully retrieved OpenAI response");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_mode_is_requested_only_for_json() {
        let client = OpenAiClient::new("sk".into(), "gpt-4o-mini".into());
        let json = serde_json::to_value(client.request("hi", ResponseFormat::Json)).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][1]["content"], "hi");

        let text = serde_json::to_value(client.request("hi", ResponseFormat::Text)).unwrap();
        assert!(text.get("response_format").is_none());
    }

    #[test]
    fn test_parse_reply() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Match Score: 82% "}}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "Match Score: 82%");

        let empty = r#"{"choices":[]}"#;
        assert!(matches!(parse_reply(empty), Err(LlmError::EmptyContent)));
    }
}
