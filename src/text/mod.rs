// src/text/mod.rs
//! Pure text helpers used by the scrapers.

pub mod contacts;
pub mod keywords;
pub mod relative_time;

pub use contacts::{extract_emails, extract_links};
pub use keywords::{load_keywords, matching_keywords};
pub use relative_time::{posted_within, relative_to_absolute};

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Shorten `text` to at most `max` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Senior\n\n  Rust   Engineer \t"), "Senior Rust Engineer");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 5), "abcd…");
        assert_eq!(truncate_chars("héllo wörld", 6), "héllo…");
    }
}
