// src/scraping/feed_scraper.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::browser::{pause, scroll_height, Browser, BrowserError, LinkedInNavigator, Pacing};
use crate::storage::{PostRecord, Storage};
use crate::tasks::{CancelToken, Progress};
use crate::text::{clean_text, extract_emails, extract_links, matching_keywords, relative_to_absolute};

const POST_SELECTOR: &str = "div.feed-shared-update-v2";
const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// A post as it appears in the feed DOM.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPost {
    pub urn: Option<String>,
    pub text: String,
    pub publisher_url: Option<String>,
    pub time_text: Option<String>,
}

impl FeedPost {
    /// `data-urn` when present, otherwise a digest of the text that is stable
    /// across runs.
    pub fn post_id(&self) -> String {
        match &self.urn {
            Some(urn) => urn.clone(),
            None => fallback_post_id(&self.text),
        }
    }
}

pub fn fallback_post_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("text:{}", &hex::encode(digest)[..16])
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedReport {
    pub scrolls: u32,
    pub seen: usize,
    pub matched: usize,
    pub saved: usize,
    pub failed: usize,
}

pub struct FeedScraper {
    browser: Arc<dyn Browser>,
    pacing: Pacing,
    storage: Storage,
    keywords: Vec<String>,
    seen: HashSet<String>,
}

impl FeedScraper {
    pub fn new(browser: Arc<dyn Browser>, pacing: Pacing, storage: Storage, keywords: Vec<String>) -> Self {
        Self {
            browser,
            pacing,
            storage,
            keywords,
            seen: HashSet::new(),
        }
    }

    /// Scroll the feed up to `max_scrolls` times, persisting every new post
    /// that mentions at least one keyword. Stops early when the page stops
    /// growing or the token is cancelled.
    pub async fn scroll_and_extract(
        &mut self,
        max_scrolls: u32,
        cancel: &CancelToken,
        progress: Progress<'_>,
    ) -> Result<FeedReport, BrowserError> {
        if self.keywords.is_empty() {
            error!("No keywords loaded, feed posts cannot match anything");
        }
        let mut report = FeedReport::default();

        LinkedInNavigator::new(Arc::clone(&self.browser), self.pacing)
            .open_feed()
            .await?;
        info!("Starting to scroll through LinkedIn feed");
        self.process_visible_posts(&mut report).await?;

        for scroll in 0..max_scrolls {
            if cancel.is_cancelled() {
                info!("Feed scrolling cancelled after {} scrolls", report.scrolls);
                break;
            }
            debug!("Scroll {}/{}", scroll + 1, max_scrolls);

            let before = scroll_height(self.browser.as_ref()).await?;
            self.browser.execute(SCROLL_TO_BOTTOM, Vec::new()).await?;
            if !self.wait_for_growth(before).await? {
                info!("No more new posts detected (page height did not increase)");
                break;
            }
            report.scrolls += 1;

            self.process_visible_posts(&mut report).await?;
            progress(format!(
                "Scroll {}/{}: {} posts seen, {} matched",
                scroll + 1,
                max_scrolls,
                report.seen,
                report.matched
            ));
        }

        info!(
            "Feed scan done: {} scrolls, {} posts seen, {} matched, {} saved",
            report.scrolls, report.seen, report.matched, report.saved
        );
        Ok(report)
    }

    async fn wait_for_growth(&self, before: i64) -> Result<bool, BrowserError> {
        let deadline = Instant::now() + self.pacing.scroll_timeout;
        loop {
            if scroll_height(self.browser.as_ref()).await? > before {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            pause(self.pacing.poll_interval).await;
        }
    }

    async fn process_visible_posts(&mut self, report: &mut FeedReport) -> Result<(), BrowserError> {
        let posts = parse_feed_posts(&self.browser.page_source().await?);
        let now = Utc::now();

        for post in posts {
            let post_id = post.post_id();
            if !self.seen.insert(post_id.clone()) {
                continue;
            }
            report.seen += 1;

            let Some(record) = build_record(&post, post_id, &self.keywords, now) else {
                debug!("Skipping post without matching keywords");
                continue;
            };
            report.matched += 1;
            info!(
                "Found keyword(s) [{}] in post {:?}",
                record.matched_keywords.join(", "),
                record.post_id
            );

            match self.storage.posts().upsert(&record).await {
                Ok(_) => report.saved += 1,
                Err(e) => {
                    error!("Error saving post {:?}: {}", record.post_id, e);
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }
}

/// Turn a matching post into a storage record; `None` when no keyword matches.
pub fn build_record(
    post: &FeedPost,
    post_id: String,
    keywords: &[String],
    now: chrono::DateTime<Utc>,
) -> Option<PostRecord> {
    let matched = matching_keywords(&post.text, keywords);
    if matched.is_empty() {
        return None;
    }
    Some(PostRecord {
        post_id: Some(post_id),
        publisher_url: post.publisher_url.clone(),
        publish_date: post
            .time_text
            .as_deref()
            .and_then(|text| relative_to_absolute(text, now)),
        links: extract_links(&post.text),
        emails: extract_emails(&post.text),
        post_text: post.text.clone(),
        matched_keywords: matched,
    })
}

fn first_text(scope: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let Ok(sel) = Selector::parse(raw) else { continue };
        if let Some(text) = scope
            .select(&sel)
            .map(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
            .find(|text| !text.is_empty())
        {
            return Some(text);
        }
    }
    None
}

fn first_href(scope: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let Ok(sel) = Selector::parse(raw) else { continue };
        if let Some(href) = scope
            .select(&sel)
            .filter_map(|el| el.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty())
        {
            return Some(href.to_string());
        }
    }
    None
}

/// Posts currently rendered in the feed, in page order.
pub fn parse_feed_posts(html: &str) -> Vec<FeedPost> {
    let document = Html::parse_document(html);
    let Ok(post_selector) = Selector::parse(POST_SELECTOR) else {
        return Vec::new();
    };

    document
        .select(&post_selector)
        .map(|post| {
            let text = first_text(
                post,
                &[".feed-shared-update-v2__description", ".update-components-text-view span"],
            )
            .unwrap_or_else(|| clean_text(&post.text().collect::<Vec<_>>().join(" ")));

            FeedPost {
                urn: post
                    .value()
                    .attr("data-urn")
                    .map(str::trim)
                    .filter(|urn| !urn.is_empty())
                    .map(str::to_string),
                publisher_url: first_href(
                    post,
                    &[
                        ".update-components-actor__container a",
                        "a[href*='/in/']",
                        "a[href*='/company/']",
                    ],
                ),
                time_text: first_text(
                    post,
                    &[
                        ".update-components-actor__sub-description .visually-hidden",
                        ".update-components-actor__sub-description",
                    ],
                ),
                text,
            }
        })
        .collect()
}
