// src/error.rs
//! Error classification shared by every subsystem.
//!
//! Each seam (storage, browser, language model, evaluation, queue, config)
//! has its own `thiserror` enum. They all map onto the closed [`ErrorKind`]
//! set, which drives the retry-vs-drop decision at the call site.

use std::fmt;

use crate::browser::BrowserError;
use crate::config::ConfigError;
use crate::evaluation::EvaluationError;
use crate::llm::LlmError;
use crate::storage::StorageError;
use crate::tasks::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// External resource hiccup: storage unreachable, model call failed,
    /// element not found. Retry if a policy exists, otherwise skip the unit.
    Transient,
    /// Missing credentials, keys or paths. The dependent feature is disabled.
    Config,
    /// A record that cannot be persisted as-is. Drop it, keep the batch going.
    DataShape,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Config => "config",
            ErrorKind::DataShape => "data-shape",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort classification of an `anyhow` chain. Unknown errors are
/// treated as transient.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<StorageError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<BrowserError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<LlmError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<EvaluationError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<QueueError>() {
            return e.kind();
        }
    }
    ErrorKind::Transient
}
