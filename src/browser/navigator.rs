// src/browser/navigator.rs
//! LinkedIn-specific navigation: login, search URLs and the feed.

use std::sync::Arc;

use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::{pause, wait_for, Browser, BrowserError, Locator, Pacing, ENTER_KEY};
use crate::config::Credentials;

pub const LOGIN_URL: &str = "https://www.linkedin.com/login";
pub const FEED_URL: &str = "https://www.linkedin.com/feed/";
const JOB_SEARCH_URL: &str = "https://www.linkedin.com/jobs/search/";
const PEOPLE_SEARCH_URL: &str = "https://www.linkedin.com/search/results/people/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum DatePosted {
    #[serde(rename = "Past 24 hours", alias = "past-24h")]
    #[value(name = "24h")]
    Past24Hours,
    #[serde(rename = "Past Week", alias = "past-week")]
    #[value(name = "week")]
    PastWeek,
    #[serde(rename = "Past Month", alias = "past-month")]
    #[value(name = "month")]
    PastMonth,
}

impl DatePosted {
    fn code(self) -> &'static str {
        match self {
            DatePosted::Past24Hours => "r86400",
            DatePosted::PastWeek => "r604800",
            DatePosted::PastMonth => "r2592000",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ExperienceLevel {
    #[serde(rename = "Internship")]
    Internship,
    #[serde(rename = "Entry level")]
    Entry,
    #[serde(rename = "Associate")]
    Associate,
    #[serde(rename = "Mid-Senior level")]
    MidSenior,
    #[serde(rename = "Director")]
    Director,
    #[serde(rename = "Executive")]
    Executive,
}

impl ExperienceLevel {
    fn code(self) -> &'static str {
        match self {
            ExperienceLevel::Internship => "1",
            ExperienceLevel::Entry => "2",
            ExperienceLevel::Associate => "3",
            ExperienceLevel::MidSenior => "4",
            ExperienceLevel::Director => "5",
            ExperienceLevel::Executive => "6",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum RemoteOption {
    Hybrid,
    #[serde(rename = "On-site")]
    OnSite,
    Remote,
}

impl RemoteOption {
    fn code(self) -> &'static str {
        match self {
            RemoteOption::Hybrid => "1",
            RemoteOption::OnSite => "2",
            RemoteOption::Remote => "3",
        }
    }
}

/// Search filters. Labels without a URL code ("Any Time", "Any", or
/// anything unrecognised) deserialize to no filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFilters {
    #[serde(deserialize_with = "known_label")]
    pub date_posted: Option<DatePosted>,
    #[serde(deserialize_with = "known_label")]
    pub experience_level: Option<ExperienceLevel>,
    pub company: Option<String>,
    #[serde(deserialize_with = "known_labels")]
    pub remote_options: Vec<RemoteOption>,
    pub easy_apply: bool,
}

fn label<T: DeserializeOwned>(value: Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            if !matches!(value, Value::Null) {
                debug!("Ignoring filter label {}", value);
            }
            None
        }
    }
}

fn known_label<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(label))
}

fn known_labels<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw.into_iter().filter_map(label).collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQuery {
    pub job_title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub filters: JobFilters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    LoggedIn,
    /// LinkedIn wants a human to finish a checkpoint in the browser window.
    VerificationRequired,
}

/// Search URL for `query`. Filters without a known code are left out.
pub fn job_search_url(query: &JobQuery) -> String {
    let mut url = Url::parse(JOB_SEARCH_URL).expect("static url is valid");
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("keywords", query.job_title.trim());
        pairs.append_pair("location", query.location.trim());

        let filters = &query.filters;
        if let Some(date) = filters.date_posted {
            pairs.append_pair("f_TPR", date.code());
        }
        if let Some(level) = filters.experience_level {
            pairs.append_pair("f_E", level.code());
        }
        if let Some(company) = filters.company.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            pairs.append_pair("f_C", company);
        }
        for option in &filters.remote_options {
            pairs.append_pair("f_WT", option.code());
        }
        if filters.easy_apply {
            pairs.append_pair("f_AL", "true");
        }
    }
    url.into()
}

/// Result page `page` (1-based) for a people search.
pub fn people_search_url(query: &str, page: u32) -> String {
    let mut url = Url::parse(PEOPLE_SEARCH_URL).expect("static url is valid");
    url.query_pairs_mut()
        .append_pair("keywords", query.trim())
        .append_pair("page", &page.max(1).to_string());
    url.into()
}

/// Page `page` (0-based) of a job search; LinkedIn shows 25 results per page.
pub fn job_search_page_url(search_url: &str, page: u32) -> String {
    if page == 0 {
        search_url.to_string()
    } else {
        format!("{}&start={}", search_url, 25 * page)
    }
}

pub fn job_view_url(job_id: &str) -> String {
    format!("https://www.linkedin.com/jobs/view/{}/", job_id)
}

pub struct LinkedInNavigator {
    browser: Arc<dyn Browser>,
    pacing: Pacing,
}

impl LinkedInNavigator {
    pub fn new(browser: Arc<dyn Browser>, pacing: Pacing) -> Self {
        Self { browser, pacing }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, BrowserError> {
        info!("Navigating to LinkedIn login page");
        self.browser.goto(LOGIN_URL).await?;
        pause(self.pacing.action_delay).await;

        self.fill(&Locator::css("#username"), &credentials.email).await?;
        let password = self.fill(&Locator::css("#password"), &credentials.password).await?;
        self.browser.send_keys(&password, ENTER_KEY).await?;
        pause(self.pacing.page_load).await;

        let landed = self.browser.current_url().await?;
        if landed.contains("checkpoint") || landed.contains("challenge") {
            warn!("LinkedIn asked for verification, finish it in the browser window");
            return Ok(LoginOutcome::VerificationRequired);
        }
        info!("Login successful");
        Ok(LoginOutcome::LoggedIn)
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<super::ElementHandle, BrowserError> {
        let field = wait_for(self.browser.as_ref(), locator, &self.pacing)
            .await?
            .remove(0);
        self.browser.clear(&field).await?;
        self.browser.send_keys(&field, text).await?;
        Ok(field)
    }

    /// Navigate to the search results for `query` and return the URL used.
    pub async fn search_jobs(&self, query: &JobQuery) -> Result<String, BrowserError> {
        let url = job_search_url(query);
        info!("Searching for jobs: {} in {}", query.job_title, query.location);
        self.browser.goto(&url).await?;
        pause(self.pacing.page_load).await;
        info!("Job search page loaded");
        Ok(url)
    }

    pub async fn open_feed(&self) -> Result<(), BrowserError> {
        info!("Opening LinkedIn feed");
        self.browser.goto(FEED_URL).await?;
        pause(self.pacing.page_load).await;
        Ok(())
    }
}
