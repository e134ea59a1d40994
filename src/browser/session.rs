// src/browser/session.rs
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{Browser, BrowserError};

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Browser>, BrowserError>;
}

/// Owns at most one live browser. Opening twice reuses the session.
pub struct SessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    current: Mutex<Option<Arc<dyn Browser>>>,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            current: Mutex::new(None),
        }
    }

    /// Returns the open browser and whether it was started by this call.
    pub async fn open(&self) -> Result<(Arc<dyn Browser>, bool), BrowserError> {
        let mut current = self.current.lock().await;
        if let Some(browser) = current.as_ref() {
            return Ok((Arc::clone(browser), false));
        }
        let browser = self.launcher.launch().await?;
        *current = Some(Arc::clone(&browser));
        info!("Browser session opened");
        Ok((browser, true))
    }

    pub async fn browser(&self) -> Result<Arc<dyn Browser>, BrowserError> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(BrowserError::SessionNotOpen)
    }

    pub async fn is_open(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Quit the browser if one is open. Returns false when nothing was open.
    pub async fn close(&self) -> bool {
        let Some(browser) = self.current.lock().await.take() else {
            return false;
        };
        if let Err(e) = browser.quit().await {
            warn!("Error while closing browser: {}", e);
        }
        info!("Browser session closed");
        true
    }
}
