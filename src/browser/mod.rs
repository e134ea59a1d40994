// src/browser/mod.rs
//! Browser automation seam.
//!
//! Everything that drives LinkedIn goes through the object-safe [`Browser`]
//! trait so scrapers can be exercised against a scripted fake. The real
//! implementation speaks W3C WebDriver to a chromedriver process.

pub mod navigator;
pub mod session;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod fake;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ErrorKind;

pub use navigator::{JobFilters, JobQuery, LinkedInNavigator, LoginOutcome};
pub use session::{BrowserLauncher, SessionManager};
pub use webdriver::{ChromeLauncher, WebDriverBrowser};

/// W3C identifier under which element references travel in JSON.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a07c-4b4e2e2b9b2f";

/// Key code for Enter in `send_keys`.
pub const ENTER_KEY: &str = "\u{E007}";

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser session not open")]
    SessionNotOpen,

    #[error("failed to start browser: {0}")]
    Launch(String),

    #[error("webdriver request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webdriver error '{error}': {message}")]
    Protocol { error: String, message: String },

    #[error("unexpected webdriver response: {0}")]
    UnexpectedResponse(String),

    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },
}

impl BrowserError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrowserError::SessionNotOpen => ErrorKind::Config,
            _ => ErrorKind::Transient,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, BrowserError::Protocol { error, .. }
            if error == "stale element reference" || error == "no such element")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub(crate) fn strategy(&self) -> (&'static str, &str) {
        match self {
            Locator::Css(s) => ("css selector", s),
            Locator::XPath(s) => ("xpath", s),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css `{s}`"),
            Locator::XPath(s) => write!(f, "xpath `{s}`"),
        }
    }
}

/// Opaque reference to an element in the live page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub(crate) String);

impl ElementHandle {
    pub fn id(&self) -> &str {
        &self.0
    }

    /// The element as a script argument (`arguments[n]` in the page).
    pub fn as_arg(&self) -> Value {
        serde_json::json!({ ELEMENT_KEY: self.0 })
    }
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;
    async fn current_url(&self) -> Result<String, BrowserError>;
    async fn page_source(&self) -> Result<String, BrowserError>;
    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError>;
    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, BrowserError>;
    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError>;
    async fn clear(&self, element: &ElementHandle) -> Result<(), BrowserError>;
    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), BrowserError>;
    async fn quit(&self) -> Result<(), BrowserError>;
}

/// Delays between browser steps. Third-party pages load at their own pace,
/// so every wait is bounded.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub page_load: Duration,
    pub poll_interval: Duration,
    pub element_timeout: Duration,
    pub scroll_timeout: Duration,
    pub action_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(3),
            poll_interval: Duration::from_millis(250),
            element_timeout: Duration::from_secs(5),
            scroll_timeout: Duration::from_secs(10),
            action_delay: Duration::from_secs(2),
        }
    }
}

impl Pacing {
    /// No sleeping at all, for tests against the fake browser.
    pub fn immediate() -> Self {
        Self {
            page_load: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            element_timeout: Duration::from_millis(20),
            scroll_timeout: Duration::from_millis(20),
            action_delay: Duration::ZERO,
        }
    }
}

/// Poll until at least one element matches `locator`.
pub async fn wait_for(
    browser: &dyn Browser,
    locator: &Locator,
    pacing: &Pacing,
) -> Result<Vec<ElementHandle>, BrowserError> {
    let deadline = Instant::now() + pacing.element_timeout;
    loop {
        let found = browser.find_all(locator).await?;
        if !found.is_empty() {
            return Ok(found);
        }
        if Instant::now() >= deadline {
            debug!("Gave up waiting for {}", locator);
            return Err(BrowserError::Timeout {
                what: locator.to_string(),
                after: pacing.element_timeout,
            });
        }
        tokio::time::sleep(pacing.poll_interval).await;
    }
}

/// Current `document.body.scrollHeight`, or 0 if the page does not report one.
pub async fn scroll_height(browser: &dyn Browser) -> Result<i64, BrowserError> {
    let value = browser
        .execute("return document.body.scrollHeight;", Vec::new())
        .await?;
    Ok(value.as_i64().unwrap_or(0))
}

pub(crate) async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
