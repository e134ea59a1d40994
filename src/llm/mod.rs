// src/llm/mod.rs
//! Language model backends used by the match evaluator.
//!
//! Every backend is a single request/response call behind [`LanguageModel`].
//! Which backend runs is decided once from configuration by [`from_settings`].

pub mod chat_service;
pub mod ollama;
pub mod openai;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, LlmSettings};
use crate::error::ErrorKind;

pub use chat_service::ChatServiceClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("model returned empty content")]
    EmptyContent,
}

impl LlmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Api { status: 401 | 403, .. } => ErrorKind::Config,
            _ => ErrorKind::Transient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    /// Ask the backend to constrain output to a JSON object when it can.
    Json,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str, format: ResponseFormat) -> Result<String, LlmError>;
}

/// Pick the configured backend: the chat service first, then OpenAI, then a
/// local Ollama.
pub fn from_settings(settings: &LlmSettings) -> Result<Arc<dyn LanguageModel>, ConfigError> {
    if let Some(url) = &settings.chat_service_url {
        info!("Using AI chat service at {}", url);
        return Ok(Arc::new(ChatServiceClient::new(url.clone())));
    }
    if let Some(key) = &settings.openai_api_key {
        info!("Using OpenAI model {}", settings.openai_model);
        return Ok(Arc::new(OpenAiClient::new(key.clone(), settings.openai_model.clone())));
    }
    if let Some(url) = &settings.ollama_url {
        info!("Using Ollama model {} at {}", settings.ollama_model, url);
        return Ok(Arc::new(OllamaClient::new(url.clone(), settings.ollama_model.clone())));
    }
    Err(ConfigError::Missing("OPENAI_API_KEY"))
}

/// Send a request built by `build`, retrying 429 and 5xx with exponential
/// backoff (1s, 2s, 4s). Returns the successful response body.
pub(crate) async fn send_with_retry<F>(build: F) -> Result<String, LlmError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_error: Option<LlmError> = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
            warn!(
                "LLM call attempt {} failed, retrying after {}ms...",
                attempt,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let response = match build().send().await {
            Ok(r) => r,
            Err(e) => {
                last_error = Some(LlmError::Http(e));
                continue;
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 || status.is_server_error() {
            warn!("LLM API returned {}: {}", status, body);
            last_error = Some(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
            continue;
        }

        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        return Ok(body);
    }

    Err(last_error.unwrap_or(LlmError::RateLimited {
        retries: MAX_RETRIES,
    }))
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

pub(crate) fn non_empty(text: Option<&str>) -> Result<String, LlmError> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(LlmError::EmptyContent)
}
