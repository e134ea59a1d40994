// src/resume.rs
//! Resume text used as the "candidate" half of every evaluation prompt.

use std::path::Path;

use tracing::{info, warn};

use crate::config::ConfigError;

const ABOUT_ME_MARKER: &str = "ABOUT ME";

/// Read the resume at `path` (PDF or plain text) and trim it to start after
/// the "ABOUT ME" heading when there is one.
pub async fn load_resume(path: &Path) -> Result<String, ConfigError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Reading resume file: {}", path.display());

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let raw = if is_pdf {
        let path_buf = path.to_path_buf();
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ConfigError::Parse {
                path: path_buf.clone(),
                message: e.to_string(),
            })?
            .map_err(|e| ConfigError::Parse {
                path: path_buf,
                message: e.to_string(),
            })?
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    let text = trim_to_about_me(&raw);
    if text.is_empty() {
        return Err(ConfigError::Invalid {
            key: "RESUME_PATH".to_string(),
            message: format!("{} contains no text", path.display()),
        });
    }
    info!("Resume loaded: {} characters", text.chars().count());
    Ok(text)
}

pub fn trim_to_about_me(text: &str) -> String {
    match text.split_once(ABOUT_ME_MARKER) {
        Some((_, rest)) => rest.trim().to_string(),
        None => {
            warn!("'{}' section not found in the resume", ABOUT_ME_MARKER);
            text.trim().to_string()
        }
    }
}
