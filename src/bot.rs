// src/bot.rs
//! The action handler behind the queue: owns the browser session, storage
//! and evaluator, and turns each [`Action`] into scraper/evaluator calls.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::browser::{
    Browser, BrowserLauncher, ChromeLauncher, JobQuery, LinkedInNavigator, LoginOutcome, Pacing,
    SessionManager,
};
use crate::config::{AppConfig, ConfigError, Credentials};
use crate::evaluation::{EvaluationStats, MatchEvaluator, PromptTemplate};
use crate::resume::load_resume;
use crate::scheduler::{load_plans, Notifier};
use crate::scraping::{FeedScraper, JobScraper, PeopleConnector};
use crate::storage::{JobRecord, Storage};
use crate::tasks::{
    Action, ActionHandler, ActionOutcome, CancelToken, EvaluateSource, JobSearch, Progress,
};
use crate::text::load_keywords;

/// Settings the bot reads on every action.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub credentials: Option<Credentials>,
    pub pacing: Pacing,
    pub keywords_file: PathBuf,
    pub plans_file: PathBuf,
    pub notifications_api: Option<String>,
    pub plan_pages: u32,
    pub min_notify_score: u8,
    pub recent_window: TimeDelta,
}

impl BotSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            credentials: config.linkedin.clone(),
            pacing: config.tunables.pacing(),
            keywords_file: config.keywords_file.clone(),
            plans_file: config.plans_file.clone(),
            notifications_api: config.notifications_api.clone(),
            plan_pages: config.tunables.plan_pages,
            min_notify_score: config.tunables.min_notify_score,
            recent_window: config.tunables.recent_window()?,
        })
    }
}

/// Build the evaluator, or explain why evaluation is disabled.
pub async fn build_evaluator(config: &AppConfig) -> Result<MatchEvaluator, ConfigError> {
    let model = crate::llm::from_settings(&config.llm)?;
    let resume = load_resume(&config.resume_path).await?;
    let template = PromptTemplate::load(&config.prompt_template_path).await?;
    Ok(MatchEvaluator::new(
        model,
        template,
        resume,
        config.tunables.evaluation_concurrency,
    ))
}

pub struct GrowHireBot {
    settings: BotSettings,
    storage: Storage,
    sessions: SessionManager,
    evaluator: Result<MatchEvaluator, String>,
    notifier: Option<Notifier>,
    last_search: Mutex<Vec<JobRecord>>,
}

impl GrowHireBot {
    pub fn new(
        settings: BotSettings,
        storage: Storage,
        launcher: Arc<dyn BrowserLauncher>,
        evaluator: Result<MatchEvaluator, String>,
    ) -> Self {
        let notifier = settings.notifications_api.as_deref().map(Notifier::new);
        Self {
            settings,
            storage,
            sessions: SessionManager::new(launcher),
            evaluator,
            notifier,
            last_search: Mutex::new(Vec::new()),
        }
    }

    /// Wire the bot from configuration. A failing evaluator setup is logged
    /// and disables evaluation only.
    pub async fn from_config(config: &AppConfig, storage: Storage) -> Result<Self, ConfigError> {
        let settings = BotSettings::from_config(config)?;
        let evaluator = match build_evaluator(config).await {
            Ok(evaluator) => {
                info!("Match evaluator ready (model: {})", evaluator.model_name());
                Ok(evaluator)
            }
            Err(e) => {
                error!("Evaluation disabled: {}", e);
                Err(e.to_string())
            }
        };
        let launcher = Arc::new(ChromeLauncher::new(config.webdriver.clone()));
        Ok(Self::new(settings, storage, launcher, evaluator))
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn evaluation_enabled(&self) -> bool {
        self.evaluator.is_ok()
    }

    pub async fn session_open(&self) -> bool {
        self.sessions.is_open().await
    }

    /// Quit the browser, if any. Used on shutdown.
    pub async fn shutdown(&self) {
        self.sessions.close().await;
    }

    fn evaluator(&self) -> Result<&MatchEvaluator, ConfigError> {
        self.evaluator.as_ref().map_err(|reason| ConfigError::Invalid {
            key: "evaluator".to_string(),
            message: reason.clone(),
        })
    }

    async fn open_session(&self, progress: Progress<'_>) -> anyhow::Result<(Arc<dyn Browser>, bool)> {
        let credentials = self
            .settings
            .credentials
            .as_ref()
            .ok_or(ConfigError::Missing("LINKEDIN_EMAIL / LINKEDIN_PASSWORD"))?;

        let (browser, started) = self.sessions.open().await?;
        if started {
            progress("Logging in to LinkedIn".to_string());
            let navigator = LinkedInNavigator::new(Arc::clone(&browser), self.settings.pacing);
            match navigator.login(credentials).await {
                Ok(LoginOutcome::LoggedIn) => progress("Logged in".to_string()),
                Ok(LoginOutcome::VerificationRequired) => progress(
                    "LinkedIn asked for verification, finish it in the browser window".to_string(),
                ),
                Err(e) => {
                    // a half-logged-in browser is useless; start over next time
                    self.sessions.close().await;
                    return Err(e).context("LinkedIn login failed");
                }
            }
        }
        Ok((browser, started))
    }

    async fn search_jobs(
        &self,
        search: JobSearch,
        cancel: &CancelToken,
        progress: Progress<'_>,
    ) -> anyhow::Result<ActionOutcome> {
        let browser = self.sessions.browser().await?;
        let url = LinkedInNavigator::new(Arc::clone(&browser), self.settings.pacing)
            .search_jobs(&search.query)
            .await?;
        let scraped = JobScraper::new(browser, self.settings.pacing)
            .scrape(&url, search.pages, cancel, progress)
            .await?;

        let records: Vec<JobRecord> = scraped.iter().map(|job| job.to_record()).collect();
        let saved = self.storage.jobs().save_batch(&records).await;
        info!(
            "Saved {} of {} scraped jobs ({} skipped)",
            saved.saved(),
            records.len(),
            saved.skipped
        );

        *self.last_search.lock().await = records
            .into_iter()
            .filter(|record| record.natural_key().is_some())
            .collect();

        Ok(ActionOutcome::JobsSearched {
            scraped: scraped.len(),
            saved,
        })
    }

    async fn evaluate_jobs(
        &self,
        source: EvaluateSource,
        cancel: &CancelToken,
        progress: Progress<'_>,
    ) -> anyhow::Result<ActionOutcome> {
        let evaluator = self.evaluator()?;
        let jobs = match source {
            EvaluateSource::LastSearch => self.last_search.lock().await.clone(),
            EvaluateSource::Unscored => self
                .storage
                .jobs()
                .list_unscored(None)
                .await?
                .iter()
                .map(JobRecord::from)
                .collect(),
        };
        if jobs.is_empty() {
            warn!("No jobs to evaluate");
        }
        progress(format!("Evaluating {} jobs with {}", jobs.len(), evaluator.model_name()));

        let EvaluationStats { scored, unscored } = self
            .evaluate_and_store(evaluator, jobs, cancel, progress, |_| {})
            .await;
        Ok(ActionOutcome::JobsEvaluated { scored, unscored })
    }

    /// Evaluate `jobs`, persisting each result as it arrives and passing it
    /// to `also`.
    async fn evaluate_and_store(
        &self,
        evaluator: &MatchEvaluator,
        jobs: Vec<JobRecord>,
        cancel: &CancelToken,
        progress: Progress<'_>,
        mut also: impl FnMut(&JobRecord),
    ) -> EvaluationStats {
        let total = jobs.len();
        let mut done = 0;
        evaluator
            .evaluate_all(jobs, cancel, |job| {
                done += 1;
                match job.score {
                    Some(score) => progress(format!("{}/{}: {} scored {}%", done, total, job.job_title, score)),
                    None => progress(format!("{}/{}: {} not scored", done, total, job.job_title)),
                }
                also(&job);
                let storage = self.storage.clone();
                async move {
                    if let Err(e) = storage.jobs().upsert(&job).await {
                        error!("Error saving evaluated job '{}' ({}): {}", job.job_title, e.kind(), e);
                    }
                }
            })
            .await
    }

    async fn scroll_feed(
        &self,
        max_scrolls: u32,
        cancel: &CancelToken,
        progress: Progress<'_>,
    ) -> anyhow::Result<ActionOutcome> {
        let browser = self.sessions.browser().await?;
        let keywords = load_keywords(&self.settings.keywords_file).await;
        let report = FeedScraper::new(browser, self.settings.pacing, self.storage.clone(), keywords)
            .scroll_and_extract(max_scrolls, cancel, progress)
            .await?;
        Ok(ActionOutcome::FeedScrolled(report))
    }

    async fn connect_people(
        &self,
        query: &str,
        pages: u32,
        cancel: &CancelToken,
        progress: Progress<'_>,
    ) -> anyhow::Result<ActionOutcome> {
        let browser = self.sessions.browser().await?;
        let requests = PeopleConnector::new(browser, self.settings.pacing)
            .search_and_connect(query, pages, cancel, progress)
            .await?;
        Ok(ActionOutcome::PeopleConnected { requests })
    }

    async fn run_plans(&self, cancel: &CancelToken, progress: Progress<'_>) -> anyhow::Result<ActionOutcome> {
        let plans = load_plans(&self.settings.plans_file).await?;
        let evaluator = self.evaluator()?;
        let (browser, _) = self.open_session(progress).await?;

        let mut ran = 0;
        let mut notified = 0;
        for plan in &plans {
            if cancel.is_cancelled() {
                info!("Plan run cancelled after {} plans", ran);
                break;
            }
            info!("Executing plan: {} in {}", plan.job_title, plan.location);
            progress(format!("Plan {}/{}: {} in {}", ran + 1, plans.len(), plan.job_title, plan.location));
            match self.run_plan(plan, Arc::clone(&browser), evaluator, cancel, progress).await {
                Ok(count) => notified += count,
                Err(e) => error!("Plan '{}' failed: {:#}", plan.job_title, e),
            }
            ran += 1;
        }

        Ok(ActionOutcome::PlansRun { plans: ran, notified })
    }

    /// Search, keep recent jobs, evaluate, and notify the high scorers.
    /// Returns how many jobs were sent.
    async fn run_plan(
        &self,
        plan: &JobQuery,
        browser: Arc<dyn Browser>,
        evaluator: &MatchEvaluator,
        cancel: &CancelToken,
        progress: Progress<'_>,
    ) -> anyhow::Result<usize> {
        let url = LinkedInNavigator::new(Arc::clone(&browser), self.settings.pacing)
            .search_jobs(plan)
            .await?;
        let scraped = JobScraper::new(browser, self.settings.pacing)
            .scrape(&url, self.settings.plan_pages, cancel, progress)
            .await?;
        if scraped.is_empty() {
            warn!("No job results found for '{}'", plan.job_title);
            return Ok(0);
        }
        info!("Found {} job listings in total", scraped.len());

        let records: Vec<JobRecord> = scraped.iter().map(|job| job.to_record()).collect();
        self.storage.jobs().save_batch(&records).await;

        let now = Utc::now();
        let recent: Vec<JobRecord> = scraped
            .iter()
            .filter(|job| job.posted_within(self.settings.recent_window, now))
            .map(|job| job.to_record())
            .filter(|record| record.natural_key().is_some())
            .collect();
        info!(
            "{} jobs posted within the last {} hours",
            recent.len(),
            self.settings.recent_window.num_hours()
        );
        if recent.is_empty() {
            return Ok(0);
        }

        let threshold = self.settings.min_notify_score;
        let mut matches = Vec::new();
        self.evaluate_and_store(evaluator, recent, cancel, progress, |job| {
            if job.score.is_some_and(|score| score >= threshold) {
                matches.push(job.clone());
            }
        })
        .await;

        if matches.is_empty() {
            warn!("No high-match job results found (score >= {}%)", threshold);
            return Ok(0);
        }

        let Some(notifier) = &self.notifier else {
            warn!("NOTIFICATIONS_API not set, {} matches kept in storage only", matches.len());
            return Ok(0);
        };
        match notifier.send(&plan.job_title, &matches).await {
            Ok(()) => Ok(matches.len()),
            Err(e) => {
                error!("Failed to send notification for plan '{}': {}", plan.job_title, e);
                Ok(0)
            }
        }
    }
}

#[async_trait]
impl ActionHandler for GrowHireBot {
    async fn handle(
        &self,
        action: Action,
        cancel: &CancelToken,
        progress: Progress<'_>,
    ) -> anyhow::Result<ActionOutcome> {
        match action {
            Action::OpenSession => {
                let (_, started) = self.open_session(progress).await?;
                Ok(ActionOutcome::Session {
                    open: true,
                    changed: started,
                })
            }
            Action::CloseSession => Ok(ActionOutcome::Session {
                open: false,
                changed: self.sessions.close().await,
            }),
            Action::SearchJobs(search) => self.search_jobs(search, cancel, progress).await,
            Action::EvaluateJobs(source) => self.evaluate_jobs(source, cancel, progress).await,
            Action::ScrollFeed { max_scrolls } => self.scroll_feed(max_scrolls, cancel, progress).await,
            Action::ConnectPeople { query, pages } => {
                self.connect_people(&query, pages, cancel, progress).await
            }
            Action::RunPlans => self.run_plans(cancel, progress).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::Ordering;

    use crate::browser::fake::FakeBrowser;
    use crate::browser::navigator::{FEED_URL, LOGIN_URL};
    use crate::browser::session::tests::FakeLauncher;
    use crate::error::{classify, ErrorKind};
    use crate::llm::fake::CannedModel;

    const RESULTS: &str = r#"
        <html><body><ul>
          <li><div data-job-id="501" class="job-card-container">
            <a class="job-card-list__title--link"><strong>Rust Engineer</strong></a>
            <div class="artdeco-entity-lockup__subtitle">Acme</div>
          </div></li>
          <li><div data-job-id="502" class="job-card-container">
            <a class="job-card-list__title--link"><strong>Platform Engineer</strong></a>
            <div class="artdeco-entity-lockup__subtitle">Globex</div>
          </div></li>
          <li><div data-job-id="" class="job-card-container">
            <a class="job-card-list__title--link"><strong>Promoted</strong></a>
          </div></li>
        </ul></body></html>
    "#;

    const DETAILS: &str = r#"
        <html><body>
          <h1 class="job-details-jobs-unified-top-card__job-title">Rust Engineer</h1>
          <div class="job-details-jobs-unified-top-card__primary-description-container">
            <span class="tvm__text">Remote</span>
            <span class="tvm__text">2 hours ago</span>
          </div>
          <div id="job-details"><p>Async services with tokio.</p></div>
        </body></html>
    "#;

    fn settings(dir: &Path) -> BotSettings {
        BotSettings {
            credentials: Some(Credentials {
                email: "me@example.com".into(),
                password: "secret".into(),
            }),
            pacing: Pacing::immediate(),
            keywords_file: dir.join("keywords.txt"),
            plans_file: dir.join("plans.json"),
            notifications_api: None,
            plan_pages: 1,
            min_notify_score: 80,
            recent_window: TimeDelta::hours(5),
        }
    }

    fn linkedin() -> Arc<FakeBrowser> {
        let fake = Arc::new(FakeBrowser::new());
        fake.add_page(LOGIN_URL, "<input id='username'/><input id='password'/>");
        fake.redirect_on_submit(FEED_URL);
        fake.add_page("https://www.linkedin.com/jobs/search/", RESULTS);
        fake.add_page("https://www.linkedin.com/jobs/view/", DETAILS);
        fake
    }

    async fn bot(
        settings: BotSettings,
        fake: Arc<FakeBrowser>,
        model: Option<CannedModel>,
    ) -> (GrowHireBot, Arc<FakeLauncher>) {
        let storage = Storage::in_memory().await.unwrap();
        let launcher = Arc::new(FakeLauncher::new(fake));
        let evaluator = match model {
            Some(model) => Ok(MatchEvaluator::new(Arc::new(model), PromptTemplate::default(), "Rust developer", 2)),
            None => Err("no language model configured".to_string()),
        };
        (GrowHireBot::new(settings, storage, launcher.clone(), evaluator), launcher)
    }

    fn search(title: &str) -> Action {
        Action::SearchJobs(JobSearch {
            query: JobQuery {
                job_title: title.into(),
                location: "Remote".into(),
                ..Default::default()
            },
            pages: 1,
        })
    }

    #[tokio::test]
    async fn test_open_session_logs_in_once() {
        let dir = tempfile::tempdir().unwrap();
        let fake = linkedin();
        let (bot, launcher) = bot(settings(dir.path()), fake.clone(), None).await;
        let cancel = CancelToken::new();

        let first = bot.handle(Action::OpenSession, &cancel, &|_| {}).await.unwrap();
        let second = bot.handle(Action::OpenSession, &cancel, &|_| {}).await.unwrap();

        assert_eq!(first, ActionOutcome::Session { open: true, changed: true });
        assert_eq!(second, ActionOutcome::Session { open: true, changed: false });
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        assert_eq!(fake.typed().len(), 2);

        let closed = bot.handle(Action::CloseSession, &cancel, &|_| {}).await.unwrap();
        assert_eq!(closed, ActionOutcome::Session { open: false, changed: true });
        assert!(fake.has_quit());
    }

    #[tokio::test]
    async fn test_missing_credentials_never_launch_a_browser() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.credentials = None;
        let (bot, launcher) = bot(settings, linkedin(), None).await;

        let err = bot
            .handle(Action::OpenSession, &CancelToken::new(), &|_| {})
            .await
            .unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Config);
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_requires_open_session() {
        let dir = tempfile::tempdir().unwrap();
        let (bot, _) = bot(settings(dir.path()), linkedin(), None).await;
        let err = bot
            .handle(search("Rust"), &CancelToken::new(), &|_| {})
            .await
            .unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_search_then_evaluate_last_search() {
        let dir = tempfile::tempdir().unwrap();
        let model = CannedModel::new().reply_when("tokio", r#"{"match_score": 85, "summary": "good"}"#);
        let (bot, _) = bot(settings(dir.path()), linkedin(), Some(model)).await;
        let cancel = CancelToken::new();

        bot.handle(Action::OpenSession, &cancel, &|_| {}).await.unwrap();
        let searched = bot.handle(search("Rust"), &cancel, &|_| {}).await.unwrap();
        match searched {
            ActionOutcome::JobsSearched { scraped, saved } => {
                assert_eq!(scraped, 3);
                assert_eq!(saved.inserted, 2);
                assert_eq!(saved.skipped, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let messages = std::sync::Mutex::new(Vec::new());
        let evaluated = bot
            .handle(Action::EvaluateJobs(EvaluateSource::LastSearch), &cancel, &|m: String| {
                messages.lock().unwrap().push(m)
            })
            .await
            .unwrap();
        assert_eq!(evaluated, ActionOutcome::JobsEvaluated { scored: 2, unscored: 0 });
        assert!(messages.lock().unwrap().iter().any(|m| m.contains("85%")));

        let stored = bot.storage().jobs().list(Default::default()).await.unwrap();
        assert!(stored.iter().all(|job| job.score == 85));
        assert!(bot.storage().jobs().list_unscored(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_evaluation_disabled_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let (bot, _) = bot(settings(dir.path()), linkedin(), None).await;
        assert!(!bot.evaluation_enabled());
        let err = bot
            .handle(Action::EvaluateJobs(EvaluateSource::Unscored), &CancelToken::new(), &|_| {})
            .await
            .unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_plans_keep_running_when_notification_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("plans.json"),
            r#"[{"job_title": "Rust Engineer", "location": "Remote"},
                {"job_title": "Platform Engineer", "location": "Berlin"}]"#,
        )
        .unwrap();
        let mut settings = settings(dir.path());
        settings.notifications_api = Some("http://127.0.0.1:9/notify".into());
        let model = CannedModel::new().reply_when("tokio", "- **Match Score: 90%**");
        let (bot, _) = bot(settings, linkedin(), Some(model)).await;

        let outcome = bot
            .handle(Action::RunPlans, &CancelToken::new(), &|_| {})
            .await
            .unwrap();

        assert_eq!(outcome, ActionOutcome::PlansRun { plans: 2, notified: 0 });
        let stored = bot.storage().jobs().list(Default::default()).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|job| job.score == 90));
        assert!(bot.session_open().await);
    }

    #[tokio::test]
    async fn test_missing_plans_file_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let (bot, launcher) = bot(settings(dir.path()), linkedin(), Some(CannedModel::new())).await;
        let err = bot
            .handle(Action::RunPlans, &CancelToken::new(), &|_| {})
            .await
            .unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Config);
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    }
}
