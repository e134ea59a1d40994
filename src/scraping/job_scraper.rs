// src/scraping/job_scraper.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{info, warn};

use super::{find_text_by_selectors, first_number};
use crate::browser::navigator::{job_search_page_url, job_view_url};
use crate::browser::{pause, wait_for, Browser, BrowserError, Locator, Pacing};
use crate::storage::JobRecord;
use crate::tasks::{CancelToken, Progress};
use crate::text::{clean_text, posted_within, relative_time};

const CARD_SELECTOR: &str = "div[data-job-id]";
const DETAIL_TITLE_SELECTOR: &str = ".job-details-jobs-unified-top-card__job-title";
const LIST_SCROLL_SCRIPT: &str = r#"
    const list = document.querySelector('.jobs-search-results-list, .scaffold-layout__list > div');
    if (list) { list.scrollTop += 500; }
    window.scrollBy(0, 500);
"#;
const LIST_SCROLL_STEPS: usize = 5;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_COMPANY: &str = "Unknown Company";
pub const UNKNOWN_LOCATION: &str = "Unknown Location";
pub const DESCRIPTION_NOT_FOUND: &str = "Not Found";

/// What a search-result card shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobCard {
    pub job_id: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub listed: Option<String>,
}

/// What the job view page shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobDetails {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub connections: i64,
    pub posted: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapedJob {
    pub job_title: String,
    pub company_name: String,
    pub job_location: String,
    pub job_url: Option<String>,
    pub job_description: String,
    pub connections: i64,
    /// Relative posting time as displayed ("3 hours ago").
    pub posted_text: Option<String>,
}

impl ScrapedJob {
    /// Merge card and detail data; details win, then card, then defaults.
    pub fn merge(card: &JobCard, details: Option<JobDetails>) -> Self {
        let details = details.unwrap_or_default();
        let pick = |detail: Option<String>, card: &Option<String>, default: &str| {
            detail
                .or_else(|| card.clone())
                .unwrap_or_else(|| default.to_string())
        };

        ScrapedJob {
            job_title: pick(details.title, &card.title, UNKNOWN_TITLE),
            company_name: pick(details.company, &card.company, UNKNOWN_COMPANY),
            job_location: pick(details.location, &card.location, UNKNOWN_LOCATION),
            job_url: card.job_id.as_deref().map(job_view_url),
            job_description: details
                .description
                .unwrap_or_else(|| DESCRIPTION_NOT_FOUND.to_string()),
            connections: details.connections,
            posted_text: details.posted.or_else(|| card.listed.clone()),
        }
    }

    pub fn has_description(&self) -> bool {
        self.job_description != DESCRIPTION_NOT_FOUND && !self.job_description.trim().is_empty()
    }

    pub fn posted_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.posted_text
            .as_deref()
            .and_then(|text| relative_time::relative_to_absolute(text, now))
    }

    pub fn posted_within(&self, window: TimeDelta, now: DateTime<Utc>) -> bool {
        self.posted_text
            .as_deref()
            .is_some_and(|text| posted_within(text, window, now))
    }

    pub fn to_record(&self) -> JobRecord {
        JobRecord {
            job_title: self.job_title.clone(),
            company_name: self.company_name.clone(),
            job_location: self.job_location.clone(),
            job_url: self.job_url.clone(),
            job_description: self.job_description.clone(),
            connections: self.connections,
            score: None,
            model_response: None,
        }
    }
}

pub struct JobScraper {
    browser: Arc<dyn Browser>,
    pacing: Pacing,
}

impl JobScraper {
    pub fn new(browser: Arc<dyn Browser>, pacing: Pacing) -> Self {
        Self { browser, pacing }
    }

    /// Walk `pages` result pages of `search_url` and open every new job.
    /// Cancellation returns what was gathered so far.
    pub async fn scrape(
        &self,
        search_url: &str,
        pages: u32,
        cancel: &CancelToken,
        progress: Progress<'_>,
    ) -> Result<Vec<ScrapedJob>, BrowserError> {
        let mut jobs = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for page in 0..pages.max(1) {
            if cancel.is_cancelled() {
                info!("Job scraping cancelled before page {}", page + 1);
                break;
            }
            info!("Scraping page {}/{}", page + 1, pages);
            progress(format!("Scraping page {}/{}", page + 1, pages));

            self.browser.goto(&job_search_page_url(search_url, page)).await?;
            pause(self.pacing.action_delay).await;
            if let Err(e) = wait_for(self.browser.as_ref(), &Locator::css(CARD_SELECTOR), &self.pacing).await {
                warn!("No job cards on page {}: {}", page + 1, e);
                break;
            }

            for _ in 0..LIST_SCROLL_STEPS {
                self.browser.execute(LIST_SCROLL_SCRIPT, Vec::new()).await?;
                pause(self.pacing.poll_interval).await;
            }

            let cards = parse_job_cards(&self.browser.page_source().await?);
            info!("Found {} jobs on page {}", cards.len(), page + 1);

            for card in cards {
                if cancel.is_cancelled() {
                    info!("Job scraping cancelled with {} jobs collected", jobs.len());
                    return Ok(jobs);
                }

                let Some(job_id) = card.job_id.clone() else {
                    warn!("Job card without an id: {:?}", card.title);
                    jobs.push(ScrapedJob::merge(&card, None));
                    continue;
                };
                if !seen.insert(job_id.clone()) {
                    continue;
                }

                let details = match self.fetch_details(&job_id).await {
                    Ok(details) => Some(details),
                    Err(e) => {
                        warn!("Job {}: details unavailable: {}", job_id, e);
                        None
                    }
                };
                let job = ScrapedJob::merge(&card, details);
                progress(format!("Job {}: {} at {}", jobs.len() + 1, job.job_title, job.company_name));
                jobs.push(job);
            }
        }

        info!("Job descriptions extraction completed: {} jobs", jobs.len());
        Ok(jobs)
    }

    async fn fetch_details(&self, job_id: &str) -> Result<JobDetails, BrowserError> {
        self.browser.goto(&job_view_url(job_id)).await?;
        wait_for(
            self.browser.as_ref(),
            &Locator::css(format!("{DETAIL_TITLE_SELECTOR}, h1.top-card-layout__title, h1")),
            &self.pacing,
        )
        .await?;
        Ok(parse_job_details(&self.browser.page_source().await?))
    }
}

fn selector(raw: &str) -> Option<Selector> {
    Selector::parse(raw).ok()
}

fn text_in(scope: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let Some(sel) = selector(raw) else { continue };
        for element in scope.select(&sel) {
            let text = clean_text(&element.text().collect::<Vec<_>>().join(" "));
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Cards on a search results page, in page order.
pub fn parse_job_cards(html: &str) -> Vec<JobCard> {
    let document = Html::parse_document(html);
    let Some(card_selector) = selector(CARD_SELECTOR) else {
        return Vec::new();
    };

    document
        .select(&card_selector)
        .map(|card| JobCard {
            job_id: card
                .value()
                .attr("data-job-id")
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            title: text_in(
                card,
                &[
                    ".job-card-list__title--link strong",
                    ".job-card-list__title",
                    ".job-card-container__link",
                    "a[aria-label]",
                ],
            ),
            company: text_in(
                card,
                &[
                    ".artdeco-entity-lockup__subtitle",
                    ".job-card-container__primary-description",
                    ".topcard__flavor",
                ],
            ),
            location: text_in(
                card,
                &[
                    ".job-card-container__metadata-wrapper li span[dir='ltr']",
                    ".job-card-container__metadata-item",
                    ".artdeco-entity-lockup__caption",
                ],
            ),
            listed: text_in(card, &["time", ".job-card-container__listed-time"]),
        })
        .collect()
}

/// Fields of a job view page. Anything missing is left empty.
pub fn parse_job_details(html: &str) -> JobDetails {
    let document = Html::parse_document(html);

    let title = find_text_by_selectors(
        &document,
        &[
            DETAIL_TITLE_SELECTOR,
            "h1.top-card-layout__title",
            "h1[data-test-id='job-title']",
            ".jobs-unified-top-card__job-title",
            "h1",
        ],
    );
    let company = find_text_by_selectors(
        &document,
        &[
            ".job-details-jobs-unified-top-card__company-name",
            ".top-card-layout__card .top-card-layout__second-subline",
            "a[data-test-id='job-poster-name']",
            ".jobs-unified-top-card__company-name",
        ],
    );
    let location = find_text_by_selectors(
        &document,
        &[
            ".job-details-jobs-unified-top-card__primary-description-container .tvm__text",
            ".job-details-jobs-unified-top-card__bullet",
            ".top-card-layout__card .top-card-layout__first-subline",
            "[data-test-id='job-location']",
            ".jobs-unified-top-card__bullet",
        ],
    );
    let description = find_text_by_selectors(
        &document,
        &[
            "#job-details",
            ".jobs-box__html-content",
            ".jobs-description__container",
            ".jobs-description-content__text",
            "[data-test-id='job-description']",
        ],
    );
    let connections = find_text_by_selectors(
        &document,
        &[
            ".job-details-jobs-unified-top-card__connections",
            ".job-card-container__job-insight-text",
        ],
    )
    .and_then(|text| first_number(&text))
    .unwrap_or(0);

    JobDetails {
        // the top-card location container also carries the posting age
        location: location.filter(|text| relative_time::parse_age(text).is_none()),
        posted: posted_text(&document),
        title,
        company,
        description,
        connections,
    }
}

fn posted_text(document: &Html) -> Option<String> {
    let candidates = [
        ".job-details-jobs-unified-top-card__tertiary-description-container span",
        ".job-details-jobs-unified-top-card__primary-description-container span",
        ".posted-time-ago__text",
        "time",
    ];
    for raw in candidates {
        let Some(sel) = selector(raw) else { continue };
        for element in document.select(&sel) {
            let text = clean_text(&element.text().collect::<Vec<_>>().join(" "));
            if relative_time::parse_age(&text).is_some() {
                return Some(text);
            }
        }
    }
    None
}
