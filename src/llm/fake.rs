// src/llm/fake.rs
//! Canned language model for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{LanguageModel, LlmError, ResponseFormat};

/// Replies are chosen by the first rule whose needle occurs in the prompt,
/// otherwise taken from the queue, otherwise `EmptyContent`.
pub(crate) struct CannedModel {
    rules: Vec<(String, Result<String, u16>)>,
    queue: Mutex<VecDeque<String>>,
    pub calls: AtomicUsize,
}

impl CannedModel {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            queue: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn reply_when(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), Ok(reply.to_string())));
        self
    }

    pub fn fail_when(mut self, needle: &str, status: u16) -> Self {
        self.rules.push((needle.to_string(), Err(status)));
        self
    }

    pub fn then_reply(self, reply: &str) -> Self {
        self.queue.lock().unwrap().push_back(reply.to_string());
        self
    }
}

#[async_trait]
impl LanguageModel for CannedModel {
    fn name(&self) -> &str {
        "canned"
    }

    async fn complete(&self, prompt: &str, _format: ResponseFormat) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for (needle, reply) in &self.rules {
            if prompt.contains(needle.as_str()) {
                return match reply {
                    Ok(text) => Ok(text.clone()),
                    Err(status) => Err(LlmError::Api {
                        status: *status,
                        message: "canned failure".into(),
                    }),
                };
            }
        }
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyContent)
    }
}
