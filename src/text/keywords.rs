// src/text/keywords.rs
use std::path::Path;

use tracing::{error, info, warn};

/// Keywords present in `text` as case-insensitive substrings, in the order
/// they appear in `keywords`. Blank keywords never match.
pub fn matching_keywords(text: &str, keywords: &[String]) -> Vec<String> {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .filter(|kw| {
            let needle = kw.trim().to_lowercase();
            !needle.is_empty() && haystack.contains(&needle)
        })
        .cloned()
        .collect()
}

/// Read one keyword per line. A missing or unreadable file yields an empty
/// list; the feed scraper then matches nothing and persists nothing.
pub async fn load_keywords(path: &Path) -> Vec<String> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            error!("Keywords file {} unavailable: {}", path.display(), e);
            return Vec::new();
        }
    };

    let keywords: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if keywords.is_empty() {
        warn!("Keywords file {} is empty", path.display());
    } else {
        info!("Loaded {} keywords from {}", keywords.len(), path.display());
    }
    keywords
}
