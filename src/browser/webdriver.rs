// src/browser/webdriver.rs
//! W3C WebDriver client for chromedriver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::session::BrowserLauncher;
use super::{Browser, BrowserError, ElementHandle, Locator, ELEMENT_KEY};
use crate::config::WebDriverSettings;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct WebDriverBrowser {
    client: Client,
    base_url: String,
    session_id: String,
}

impl WebDriverBrowser {
    /// Start a new Chrome session on the chromedriver at `settings.url`.
    pub async fn launch(settings: &WebDriverSettings) -> Result<Self, BrowserError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        let base_url = settings.url.trim_end_matches('/').to_string();

        info!("Starting Chrome via WebDriver at {}", base_url);
        let response = client
            .post(format!("{}/session", base_url))
            .json(&json!({ "capabilities": { "alwaysMatch": chrome_capabilities(settings) } }))
            .send()
            .await
            .map_err(|e| BrowserError::Launch(format!("cannot reach {}: {}", base_url, e)))?;

        let value = read_value(response).await.map_err(|e| {
            error!("Failed to initialize Chrome WebDriver: {}", e);
            BrowserError::Launch(e.to_string())
        })?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::UnexpectedResponse(format!("no sessionId in {}", value)))?
            .to_string();

        info!("Chrome WebDriver session {} initialized", session_id);
        Ok(Self {
            client,
            base_url,
            session_id,
        })
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let url = if path.is_empty() {
            format!("{}/session/{}", self.base_url, self.session_id)
        } else {
            format!("{}/session/{}/{}", self.base_url, self.session_id, path)
        };

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        read_value(response).await
    }
}

/// Unwrap the `value` member of a WebDriver reply, turning error payloads
/// into [`BrowserError::Protocol`].
async fn read_value(response: reqwest::Response) -> Result<Value, BrowserError> {
    let status = response.status();
    let body: Value = response.json().await?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();
    Err(BrowserError::Protocol { error, message })
}

fn chrome_capabilities(settings: &WebDriverSettings) -> Value {
    let mut args = vec![
        "--log-level=3".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--incognito".to_string(),
        format!("user-agent={}", USER_AGENT),
    ];

    if settings.headless {
        args.push("--headless=new".to_string());
    }

    if settings.in_container {
        info!("Running inside a container, applying container Chrome flags");
        args.extend(
            [
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-gpu",
                "--start-maximized",
                "--window-size=1920,1080",
            ]
            .map(String::from),
        );
        args.push(format!("--user-data-dir=/tmp/chrome-user-data-{}", std::process::id()));
    }

    json!({
        "browserName": "chrome",
        "goog:chromeOptions": {
            "args": args,
            "excludeSwitches": ["enable-automation", "enable-logging"],
            "useAutomationExtension": false,
        }
    })
}

fn element_from(value: &Value) -> Option<ElementHandle> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementHandle(id.to_string()))
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::UnexpectedResponse(format!("url was {}", value)))
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "source", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::UnexpectedResponse("page source was not a string".into()))
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, BrowserError> {
        let (using, value) = locator.strategy();
        let found = self
            .command(
                Method::POST,
                "elements",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        Ok(found
            .as_array()
            .map(|items| items.iter().filter_map(element_from).collect())
            .unwrap_or_default())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.command(
            Method::POST,
            &format!("element/{}/click", element.id()),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.command(
            Method::POST,
            &format!("element/{}/clear", element.id()),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), BrowserError> {
        self.command(
            Method::POST,
            &format!("element/{}/value", element.id()),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn quit(&self) -> Result<(), BrowserError> {
        info!("Stopping WebDriver session {}", self.session_id);
        if let Err(e) = self.command(Method::DELETE, "", None).await {
            warn!("WebDriver session did not close cleanly: {}", e);
            return Err(e);
        }
        Ok(())
    }
}

/// Launches Chrome sessions against a chromedriver endpoint.
pub struct ChromeLauncher {
    settings: WebDriverSettings,
}

impl ChromeLauncher {
    pub fn new(settings: WebDriverSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>, BrowserError> {
        let browser = WebDriverBrowser::launch(&self.settings).await?;
        Ok(Arc::new(browser))
    }
}
