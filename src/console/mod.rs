// src/console/mod.rs
//! Interactive console.
//!
//! Input lines are parsed with clap like the one-shot CLI. Work goes to the
//! action queue and its events are printed as they arrive, so the prompt
//! never waits on the browser or the model.

pub mod views;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::bot::GrowHireBot;
use crate::cli::{ListJobsArgs, SearchArgs};
use crate::config::AppConfig;
use crate::scheduler::{Schedule, SchedulerHandle};
use crate::storage::Storage;
use crate::tasks::{Action, ActionEvent, ActionQueue, EvaluateSource};

const PROMPT: &str = "growhire> ";
const RESULTS_LIMIT: i64 = 20;

#[derive(Parser, Debug)]
#[command(name = "growhire", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

#[derive(Subcommand, Debug)]
pub enum ShellCommand {
    /// Open the browser and log in
    Login,
    /// Close the browser
    Logout,
    /// Search jobs and store the results
    Search(SearchArgs),
    /// Score the last search, or every unscored job with --unscored
    Evaluate {
        #[arg(long)]
        unscored: bool,
    },
    /// Scroll the feed and keep posts that mention a keyword
    Scroll {
        #[arg(long)]
        max_scrolls: Option<u32>,
    },
    /// Send invitations to people matching a query
    Connect {
        query: String,
        #[arg(long)]
        pages: Option<u32>,
    },
    /// Turn scheduled notifications on or off
    Notify {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Show stored jobs
    Jobs(ListJobsArgs),
    /// Show stored posts
    Posts {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Stop the running action, or everything queued with --all
    Stop {
        #[arg(long)]
        all: bool,
    },
    /// Session, queue and notification state
    Status,
    /// Leave the console
    #[command(alias = "exit")]
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

/// Split a line into words, honouring single and double quotes.
pub fn split_args(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err("unterminated quote".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// One status line per queue event.
pub fn describe_event(event: &ActionEvent) -> String {
    match event {
        ActionEvent::Queued { id, action } => format!("[#{id}] queued: {action}"),
        ActionEvent::Started { id, action } => format!("[#{id}] started: {action}"),
        ActionEvent::Progress { id, message } => format!("[#{id}]   {message}"),
        ActionEvent::Finished { id, outcome } => format!("[#{id}] ✅ {outcome}"),
        ActionEvent::Failed { id, kind, message } => format!("[#{id}] ❌ failed ({kind}): {message}"),
        ActionEvent::Cancelled { id } => format!("[#{id}] ⏹ stopped"),
    }
}

/// Cancel everything and print events until the worker is idle.
pub async fn wind_down(queue: &ActionQueue, events: &mut UnboundedReceiver<ActionEvent>) {
    queue.cancel_all();
    while queue.current().is_some() || queue.pending() > 0 {
        match events.recv().await {
            Some(event) if event.is_terminal() => println!("{}", describe_event(&event)),
            Some(_) => {}
            None => break,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Shell {
    bot: Arc<GrowHireBot>,
    storage: Storage,
    queue: ActionQueue,
    events: UnboundedReceiver<ActionEvent>,
    schedule: Result<Schedule, String>,
    run_plans_on_start: bool,
    scheduler: Option<SchedulerHandle>,
    plain: bool,
    search_pages: u32,
    max_scrolls: u32,
    people_pages: u32,
}

impl Shell {
    pub fn new(bot: Arc<GrowHireBot>, storage: Storage, config: &AppConfig, plain: bool) -> Self {
        let (queue, events) = ActionQueue::spawn(bot.clone(), config.tunables.queue_capacity);
        Self {
            bot,
            storage,
            queue,
            events,
            schedule: config.tunables.schedule().map_err(|e| e.to_string()),
            run_plans_on_start: config.tunables.run_plans_on_start,
            scheduler: None,
            plain,
            search_pages: config.tunables.search_pages,
            max_scrolls: config.tunables.max_scrolls,
            people_pages: config.tunables.people_pages,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        println!("GrowHire console. Type 'help' for commands, 'quit' to leave.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        prompt().await;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if self.execute(&line).await? == Flow::Quit {
                        break;
                    }
                    prompt().await;
                }
                Some(event) = self.events.recv() => {
                    self.on_event(event).await;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn on_event(&self, event: ActionEvent) {
        println!("{}", describe_event(&event));
        if let ActionEvent::Finished { outcome, .. } = &event {
            if outcome.touches_jobs() {
                self.print_jobs(&ListJobsArgs {
                    min_score: None,
                    limit: RESULTS_LIMIT,
                })
                .await;
            }
        }
    }

    async fn execute(&mut self, line: &str) -> Result<Flow> {
        let words = match split_args(line) {
            Ok(words) if words.is_empty() => return Ok(Flow::Continue),
            Ok(words) => words,
            Err(e) => {
                println!("⚠️ {}", e);
                return Ok(Flow::Continue);
            }
        };
        let command = match ShellLine::try_parse_from(words) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                // help output and usage errors alike
                println!("{}", e.render());
                return Ok(Flow::Continue);
            }
        };

        match command {
            ShellCommand::Login => self.submit(Action::OpenSession),
            ShellCommand::Logout => self.submit(Action::CloseSession),
            ShellCommand::Search(args) => {
                self.submit(Action::SearchJobs(args.to_search(self.search_pages)));
                if args.evaluate {
                    self.submit(Action::EvaluateJobs(EvaluateSource::LastSearch));
                }
            }
            ShellCommand::Evaluate { unscored } => self.submit(Action::EvaluateJobs(if unscored {
                EvaluateSource::Unscored
            } else {
                EvaluateSource::LastSearch
            })),
            ShellCommand::Scroll { max_scrolls } => self.submit(Action::ScrollFeed {
                max_scrolls: max_scrolls.unwrap_or(self.max_scrolls),
            }),
            ShellCommand::Connect { query, pages } => self.submit(Action::ConnectPeople {
                query,
                pages: pages.unwrap_or(self.people_pages),
            }),
            ShellCommand::Notify { state } => self.toggle_notifications(state).await,
            ShellCommand::Jobs(args) => self.print_jobs(&args).await,
            ShellCommand::Posts { limit } => match self.storage.posts().list(Some(limit)).await {
                Ok(posts) => print!("{}", views::render_posts(&posts, self.plain)),
                Err(e) => println!("❌ Could not read posts ({}): {}", e.kind(), e),
            },
            ShellCommand::Stop { all } => {
                if all {
                    println!("Stopping {} actions", self.queue.cancel_all());
                } else if let Some(id) = self.queue.cancel_current() {
                    println!("Stopping action #{}", id);
                } else {
                    println!("Nothing is running");
                }
            }
            ShellCommand::Status => self.print_status().await,
            ShellCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn submit(&self, action: Action) {
        if let Err(e) = self.queue.submit(action) {
            println!("⚠️ {} ({}), try again once the current work finishes", e, e.kind());
        }
    }

    async fn toggle_notifications(&mut self, state: Toggle) {
        match (state, self.scheduler.take()) {
            (Toggle::On, Some(running)) => {
                self.scheduler = Some(running);
                println!("Notifications are already enabled");
            }
            (Toggle::On, None) => match &self.schedule {
                Ok(schedule) => {
                    self.scheduler = Some(SchedulerHandle::spawn(
                        self.queue.clone(),
                        schedule.clone(),
                        self.run_plans_on_start,
                    ));
                    info!("Notifications have been enabled");
                    println!("Notifications are enabled");
                }
                Err(e) => println!("❌ Notifications unavailable: {}", e),
            },
            (Toggle::Off, Some(running)) => {
                running.stop().await;
                info!("Notifications have been disabled");
                println!("Notifications are disabled");
            }
            (Toggle::Off, None) => println!("Notifications are already disabled"),
        }
    }

    async fn print_jobs(&self, args: &ListJobsArgs) {
        match self.storage.jobs().list(args.filter()).await {
            Ok(jobs) => print!("{}", views::render_jobs(&jobs, self.plain)),
            Err(e) => println!("❌ Could not read jobs ({}): {}", e.kind(), e),
        }
    }

    async fn print_status(&self) {
        let session = if self.bot.session_open().await { "open" } else { "closed" };
        let evaluation = if self.bot.evaluation_enabled() { "enabled" } else { "disabled" };
        let notifications = match &self.scheduler {
            Some(handle) if handle.is_running() => "enabled",
            _ => "disabled",
        };
        let running = self
            .queue
            .current()
            .map(|id| format!("#{}", id))
            .unwrap_or_else(|| "idle".to_string());
        println!("Browser session: {}", session);
        println!("Evaluation:      {}", evaluation);
        println!("Notifications:   {}", notifications);
        println!("Worker:          {} ({} queued)", running, self.queue.pending());
    }

    async fn shutdown(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
        if self.queue.current().is_some() {
            warn!("Stopping running work before exit");
        }
        wind_down(&self.queue, &mut self.events).await;
        self.bot.shutdown().await;
        println!("Bye.");
    }
}

async fn prompt() {
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(PROMPT.as_bytes()).await;
    let _ = stdout.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tasks::ActionOutcome;

    fn parse(line: &str) -> Result<ShellCommand, clap::Error> {
        ShellLine::try_parse_from(split_args(line).unwrap()).map(|parsed| parsed.command)
    }

    #[test]
    fn test_split_args_with_quotes() {
        assert_eq!(
            split_args(r#"search "Rust Engineer" --location 'New York'"#).unwrap(),
            vec!["search", "Rust Engineer", "--location", "New York"]
        );
        assert_eq!(split_args("  status  ").unwrap(), vec!["status"]);
        assert_eq!(split_args(r#"connect """#).unwrap(), vec!["connect", ""]);
        assert!(split_args(r#"search "open"#).is_err());
    }

    #[test]
    fn test_parse_search_line() {
        let ShellCommand::Search(args) = parse(r#"search "Data Engineer" --location Paris --evaluate --pages 2"#).unwrap() else {
            panic!("expected search");
        };
        let search = args.to_search(1);
        assert_eq!(search.query.job_title, "Data Engineer");
        assert_eq!(search.query.location, "Paris");
        assert_eq!(search.pages, 2);
        assert!(args.evaluate);
    }

    #[test]
    fn test_parse_panel_commands() {
        assert!(matches!(parse("notify on").unwrap(), ShellCommand::Notify { state: Toggle::On }));
        assert!(matches!(parse("stop --all").unwrap(), ShellCommand::Stop { all: true }));
        assert!(matches!(parse("exit").unwrap(), ShellCommand::Quit));
        assert!(matches!(
            parse("jobs --min-score 80").unwrap(),
            ShellCommand::Jobs(ListJobsArgs { min_score: Some(80), limit: 50 })
        ));
        assert!(parse("notify maybe").is_err());
        assert_eq!(
            parse("help").unwrap_err().kind(),
            clap::error::ErrorKind::DisplayHelp
        );
    }

    #[test]
    fn test_describe_event() {
        let finished = ActionEvent::Finished {
            id: 3,
            outcome: ActionOutcome::PeopleConnected { requests: 4 },
        };
        assert_eq!(describe_event(&finished), "[#3] ✅ sent 4 connection requests");

        let failed = ActionEvent::Failed {
            id: 4,
            kind: ErrorKind::Config,
            message: "LINKEDIN_EMAIL missing".into(),
        };
        assert_eq!(describe_event(&failed), "[#4] ❌ failed (config): LINKEDIN_EMAIL missing");
    }
}
