// src/evaluation/score.rs
//! Match score extraction from free-form model replies.

use std::sync::LazyLock;

use regex::Regex;
use tracing::error;

static SCORE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"-\s*\*\*Match Score:\s*(\d+)%\*\*",
        r"Match Score:\s*(\d+)%",
        r"-\s*Match Score:\s*(\d+)%",
        r"\*\*Match Score:\s*(\d+)%\*\*",
        r"\bMatch Score\s*[:\-]?\s*(\d+)%",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid score pattern"))
    .collect()
});

/// Pull "Match Score: NN%" out of `text`. A line scan runs first, then a
/// list of regex fallbacks. `None` when nothing matches.
pub fn extract_match_score(text: &str) -> Option<u32> {
    for line in text.lines().filter(|line| line.contains("Match Score")) {
        for word in line.split_whitespace() {
            let digits = word.trim_matches('%');
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(score) = digits.parse() {
                    return Some(score);
                }
            }
        }
    }

    for pattern in SCORE_PATTERNS.iter() {
        if let Some(score) = pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
        {
            return Some(score);
        }
    }

    error!("Match Score not found in response");
    None
}

pub fn clamp_score(score: u32) -> u8 {
    score.min(100) as u8
}
