// src/cli.rs
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use crate::bot::GrowHireBot;
use crate::browser::navigator::{DatePosted, ExperienceLevel, RemoteOption};
use crate::browser::{JobFilters, JobQuery};
use crate::config::AppConfig;
use crate::console::{self, views};
use crate::scheduler::SchedulerHandle;
use crate::storage::{JobFilter, Storage};
use crate::tasks::{
    Action, ActionHandler, ActionQueue, CancelToken, EvaluateSource, JobSearch,
};

#[derive(Parser)]
#[command(name = "growhire")]
#[command(about = "LinkedIn job search, match scoring and feed monitoring")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Print bare URLs instead of terminal hyperlinks
    #[arg(long, global = true)]
    pub plain: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the database tables
    InitDb,
    /// Search, evaluate and list jobs
    #[command(subcommand)]
    Jobs(JobsCommand),
    /// Scan the feed and list saved posts
    #[command(subcommand)]
    Posts(PostsCommand),
    /// Search people and send connection requests
    #[command(subcommand)]
    People(PeopleCommand),
    /// Run the notification plans on the daily schedule until interrupted
    Schedule {
        /// Wait for the first scheduled time instead of running immediately
        #[arg(long)]
        no_initial_run: bool,
    },
    /// Interactive console (the default)
    Shell,
}

#[derive(Subcommand)]
pub enum JobsCommand {
    /// Search LinkedIn and store the results
    Search(SearchArgs),
    /// Score stored jobs that have no model response yet
    Evaluate,
    /// Show stored jobs, best matches first
    List(ListJobsArgs),
}

#[derive(Subcommand)]
pub enum PostsCommand {
    /// Scroll the feed and keep posts that mention a keyword
    Scroll {
        #[arg(long)]
        max_scrolls: Option<u32>,
    },
    /// Show stored posts, newest first
    List {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum PeopleCommand {
    /// Send invitations to people matching a query
    Connect {
        query: String,
        #[arg(long)]
        pages: Option<u32>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Job title or keywords
    pub title: String,
    #[arg(long, default_value = "")]
    pub location: String,
    #[arg(long)]
    pub pages: Option<u32>,
    #[arg(long, value_enum)]
    pub date_posted: Option<DatePosted>,
    #[arg(long, value_enum)]
    pub experience: Option<ExperienceLevel>,
    #[arg(long)]
    pub company: Option<String>,
    #[arg(long = "remote", value_enum)]
    pub remote_options: Vec<RemoteOption>,
    #[arg(long)]
    pub easy_apply: bool,
    /// Score the results right after scraping
    #[arg(long)]
    pub evaluate: bool,
}

impl SearchArgs {
    pub fn to_search(&self, default_pages: u32) -> JobSearch {
        JobSearch {
            query: JobQuery {
                job_title: self.title.clone(),
                location: self.location.clone(),
                filters: JobFilters {
                    date_posted: self.date_posted,
                    experience_level: self.experience,
                    company: self.company.clone(),
                    remote_options: self.remote_options.clone(),
                    easy_apply: self.easy_apply,
                },
            },
            pages: self.pages.unwrap_or(default_pages),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListJobsArgs {
    #[arg(long)]
    pub min_score: Option<u8>,
    #[arg(long, default_value_t = 50)]
    pub limit: i64,
}

impl Default for ListJobsArgs {
    fn default() -> Self {
        Self {
            min_score: None,
            limit: 50,
        }
    }
}

impl ListJobsArgs {
    pub fn filter(&self) -> JobFilter {
        JobFilter {
            min_score: self.min_score,
            limit: Some(self.limit),
        }
    }
}

pub async fn connect_storage(config: &AppConfig) -> Result<Storage> {
    Ok(Storage::connect(&config.database_url, config.tunables.retry_policy()).await?)
}

pub async fn handle_command(cli: Cli, config: AppConfig) -> Result<()> {
    let storage = connect_storage(&config).await?;
    let plain = cli.plain;

    match cli.command.unwrap_or(Command::Shell) {
        Command::InitDb => {
            let jobs = storage.jobs().count().await?;
            let posts = storage.posts().count().await?;
            println!("Database ready: {} jobs, {} posts", jobs, posts);
        }

        Command::Jobs(JobsCommand::List(args)) => {
            let jobs = storage.jobs().list(args.filter()).await?;
            print!("{}", views::render_jobs(&jobs, plain));
        }

        Command::Posts(PostsCommand::List { limit }) => {
            let posts = storage.posts().list(Some(limit)).await?;
            print!("{}", views::render_posts(&posts, plain));
        }

        Command::Jobs(JobsCommand::Search(args)) => {
            let bot = GrowHireBot::from_config(&config, storage.clone()).await?;
            let mut actions = vec![
                Action::OpenSession,
                Action::SearchJobs(args.to_search(config.tunables.search_pages)),
            ];
            if args.evaluate {
                actions.push(Action::EvaluateJobs(EvaluateSource::LastSearch));
            }
            run_sequence(&bot, actions).await?;
            let jobs = storage.jobs().list(ListJobsArgs::default().filter()).await?;
            print!("{}", views::render_jobs(&jobs, plain));
        }

        Command::Jobs(JobsCommand::Evaluate) => {
            let bot = GrowHireBot::from_config(&config, storage.clone()).await?;
            run_sequence(&bot, vec![Action::EvaluateJobs(EvaluateSource::Unscored)]).await?;
            let jobs = storage.jobs().list(ListJobsArgs::default().filter()).await?;
            print!("{}", views::render_jobs(&jobs, plain));
        }

        Command::Posts(PostsCommand::Scroll { max_scrolls }) => {
            let bot = GrowHireBot::from_config(&config, storage.clone()).await?;
            let max_scrolls = max_scrolls.unwrap_or(config.tunables.max_scrolls);
            run_sequence(&bot, vec![Action::OpenSession, Action::ScrollFeed { max_scrolls }]).await?;
            let posts = storage.posts().list(Some(50)).await?;
            print!("{}", views::render_posts(&posts, plain));
        }

        Command::People(PeopleCommand::Connect { query, pages }) => {
            let bot = GrowHireBot::from_config(&config, storage.clone()).await?;
            let pages = pages.unwrap_or(config.tunables.people_pages);
            run_sequence(&bot, vec![Action::OpenSession, Action::ConnectPeople { query, pages }]).await?;
        }

        Command::Schedule { no_initial_run } => {
            let bot = Arc::new(GrowHireBot::from_config(&config, storage.clone()).await?);
            run_scheduler(bot, &config, !no_initial_run).await?;
        }

        Command::Shell => {
            let bot = Arc::new(GrowHireBot::from_config(&config, storage.clone()).await?);
            console::Shell::new(bot, storage.clone(), &config, plain).run().await?;
        }
    }

    storage.close().await;
    Ok(())
}

/// Run `actions` in order on the current task, stopping at the first
/// failure. Ctrl-C trips the cancel token of the running action.
async fn run_sequence(bot: &GrowHireBot, actions: Vec<Action>) -> Result<()> {
    let cancel = CancelToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, finishing the current step");
                cancel.cancel();
            }
        })
    };
    let progress = |message: String| println!("  {}", message);

    let mut result = Ok(());
    for action in actions {
        if cancel.is_cancelled() {
            break;
        }
        println!("> {}", action);
        match bot.handle(action, &cancel, &progress).await {
            Ok(outcome) => println!("✅ {}", outcome),
            Err(e) => {
                error!("Action failed: {:#}", e);
                result = Err(e);
                break;
            }
        }
    }

    watcher.abort();
    bot.shutdown().await;
    result
}

async fn run_scheduler(bot: Arc<GrowHireBot>, config: &AppConfig, run_on_start: bool) -> Result<()> {
    let schedule = config.tunables.schedule()?;
    let (queue, mut events) = ActionQueue::spawn(bot.clone(), config.tunables.queue_capacity);
    let scheduler = SchedulerHandle::spawn(queue.clone(), schedule, run_on_start);
    println!("Scheduler running, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("{}", console::describe_event(&event)),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    scheduler.stop().await;
    console::wind_down(&queue, &mut events).await;
    bot.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_args_map_to_query() {
        let cli = Cli::try_parse_from([
            "growhire",
            "jobs",
            "search",
            "Rust Engineer",
            "--location",
            "Berlin",
            "--date-posted",
            "24h",
            "--remote",
            "remote",
            "--remote",
            "hybrid",
            "--easy-apply",
        ])
        .unwrap();
        let Some(Command::Jobs(JobsCommand::Search(args))) = cli.command else {
            panic!("expected jobs search");
        };
        let search = args.to_search(3);
        assert_eq!(search.pages, 3);
        assert_eq!(search.query.job_title, "Rust Engineer");
        assert_eq!(search.query.filters.date_posted, Some(DatePosted::Past24Hours));
        assert_eq!(
            search.query.filters.remote_options,
            vec![RemoteOption::Remote, RemoteOption::Hybrid]
        );
        assert!(search.query.filters.easy_apply);
    }

    #[test]
    fn test_no_subcommand_means_shell() {
        let cli = Cli::try_parse_from(["growhire", "--plain"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.plain);
    }

    #[test]
    fn test_list_filter() {
        let cli = Cli::try_parse_from(["growhire", "jobs", "list", "--min-score", "80"]).unwrap();
        let Some(Command::Jobs(JobsCommand::List(args))) = cli.command else {
            panic!("expected jobs list");
        };
        let filter = args.filter();
        assert_eq!(filter.min_score, Some(80));
        assert_eq!(filter.limit, Some(50));
    }
}
