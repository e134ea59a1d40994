// src/scraping/mod.rs
//! Scrapers that read LinkedIn pages through a [`crate::browser::Browser`].
//!
//! Page parsing is kept in pure functions over HTML strings so it can be
//! tested without a browser. Selectors are ordered fallbacks; a missing
//! field degrades to a default rather than failing the unit.

pub mod feed_scraper;
pub mod job_scraper;
pub mod people;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::text::clean_text;

pub use feed_scraper::{FeedReport, FeedScraper};
pub use job_scraper::{JobScraper, ScrapedJob};
pub use people::PeopleConnector;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").expect("valid regex"));

/// First non-empty text found by trying `selectors` in order.
pub(crate) fn find_text_by_selectors(document: &Html, selectors: &[&str]) -> Option<String> {
    for selector_str in selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            for element in document.select(&selector) {
                let text = clean_text(&element.text().collect::<Vec<_>>().join(" "));
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }
    None
}

/// First run of digits in `text`, e.g. the 12 in "12 connections".
pub(crate) fn first_number(text: &str) -> Option<i64> {
    NUMBER
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
