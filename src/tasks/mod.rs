// src/tasks/mod.rs
//! Serialized execution of browser-bound work.
//!
//! Every action goes through one bounded [`ActionQueue`] served by a single
//! worker task, so only one action drives the browser at a time. Callers get
//! [`ActionEvent`]s back on an unbounded channel and never block on work.

pub mod cancel;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::browser::JobQuery;
use crate::error::{classify, ErrorKind};
use crate::scraping::FeedReport;
use crate::storage::SaveReport;

pub use cancel::CancelToken;

/// Progress callback handed to long-running work.
pub type Progress<'a> = &'a (dyn Fn(String) + Send + Sync);

pub type ActionId = u64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("action queue is full")]
    Full,

    #[error("action queue is closed")]
    Closed,
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::Full => ErrorKind::Transient,
            QueueError::Closed => ErrorKind::Config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSearch {
    pub query: JobQuery,
    pub pages: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluateSource {
    /// Jobs scraped by the most recent search in this session.
    LastSearch,
    /// Stored jobs that have no model response yet.
    Unscored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    OpenSession,
    CloseSession,
    SearchJobs(JobSearch),
    EvaluateJobs(EvaluateSource),
    ScrollFeed { max_scrolls: u32 },
    ConnectPeople { query: String, pages: u32 },
    RunPlans,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::OpenSession => write!(f, "open session"),
            Action::CloseSession => write!(f, "close session"),
            Action::SearchJobs(search) => write!(
                f,
                "search '{}' in '{}' ({} pages)",
                search.query.job_title, search.query.location, search.pages
            ),
            Action::EvaluateJobs(EvaluateSource::LastSearch) => write!(f, "evaluate last search"),
            Action::EvaluateJobs(EvaluateSource::Unscored) => write!(f, "evaluate unscored jobs"),
            Action::ScrollFeed { max_scrolls } => write!(f, "scroll feed ({} scrolls)", max_scrolls),
            Action::ConnectPeople { query, pages } => {
                write!(f, "connect with '{}' ({} pages)", query, pages)
            }
            Action::RunPlans => write!(f, "run notification plans"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Session { open: bool, changed: bool },
    JobsSearched { scraped: usize, saved: SaveReport },
    JobsEvaluated { scored: usize, unscored: usize },
    FeedScrolled(FeedReport),
    PeopleConnected { requests: usize },
    PlansRun { plans: usize, notified: usize },
}

impl ActionOutcome {
    /// Whether the job table changed and views should re-read it.
    pub fn touches_jobs(&self) -> bool {
        matches!(
            self,
            ActionOutcome::JobsSearched { .. }
                | ActionOutcome::JobsEvaluated { .. }
                | ActionOutcome::PlansRun { .. }
        )
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Session { open: true, changed: true } => write!(f, "browser session started"),
            ActionOutcome::Session { open: true, changed: false } => write!(f, "browser session already open"),
            ActionOutcome::Session { open: false, changed: true } => write!(f, "browser session closed"),
            ActionOutcome::Session { open: false, changed: false } => write!(f, "no browser session to close"),
            ActionOutcome::JobsSearched { scraped, saved } => write!(
                f,
                "scraped {} jobs: {} new, {} updated, {} skipped, {} failed",
                scraped, saved.inserted, saved.updated, saved.skipped, saved.failed
            ),
            ActionOutcome::JobsEvaluated { scored, unscored } => {
                write!(f, "evaluated {} jobs ({} without a score)", scored + unscored, unscored)
            }
            ActionOutcome::FeedScrolled(report) => write!(
                f,
                "{} scrolls, {} posts seen, {} matched, {} saved",
                report.scrolls, report.seen, report.matched, report.saved
            ),
            ActionOutcome::PeopleConnected { requests } => {
                write!(f, "sent {} connection requests", requests)
            }
            ActionOutcome::PlansRun { plans, notified } => {
                write!(f, "ran {} plans, notified {} jobs", plans, notified)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    Queued { id: ActionId, action: String },
    Started { id: ActionId, action: String },
    Progress { id: ActionId, message: String },
    Finished { id: ActionId, outcome: ActionOutcome },
    Failed { id: ActionId, kind: ErrorKind, message: String },
    Cancelled { id: ActionId },
}

impl ActionEvent {
    pub fn id(&self) -> ActionId {
        match self {
            ActionEvent::Queued { id, .. }
            | ActionEvent::Started { id, .. }
            | ActionEvent::Progress { id, .. }
            | ActionEvent::Finished { id, .. }
            | ActionEvent::Failed { id, .. }
            | ActionEvent::Cancelled { id } => *id,
        }
    }

    /// Finished, failed or cancelled: nothing more will follow for this id.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionEvent::Finished { .. } | ActionEvent::Failed { .. } | ActionEvent::Cancelled { .. }
        )
    }
}

/// Executes one action at a time on behalf of the queue worker.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        action: Action,
        cancel: &CancelToken,
        progress: Progress<'_>,
    ) -> anyhow::Result<ActionOutcome>;
}

struct QueuedAction {
    id: ActionId,
    action: Action,
    cancel: CancelToken,
}

#[derive(Default)]
struct QueueState {
    next_id: AtomicU64,
    pending: Mutex<HashMap<ActionId, CancelToken>>,
    current: Mutex<Option<(ActionId, CancelToken)>>,
}

impl QueueState {
    fn start(&self, id: ActionId, cancel: &CancelToken) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some((id, cancel.clone()));
        }
    }

    fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

/// Handle to the single action worker. Clones share the same queue; the
/// worker stops once every handle is dropped and the queue drains.
#[derive(Clone)]
pub struct ActionQueue {
    sender: mpsc::Sender<QueuedAction>,
    events: mpsc::UnboundedSender<ActionEvent>,
    state: Arc<QueueState>,
}

impl ActionQueue {
    pub fn spawn(
        handler: Arc<dyn ActionHandler>,
        capacity: usize,
    ) -> (Self, mpsc::UnboundedReceiver<ActionEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (events, event_rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());

        tokio::spawn(run_worker(handler, receiver, events.clone(), Arc::clone(&state)));
        info!("Action worker started (capacity {})", capacity.max(1));

        (Self { sender, events, state }, event_rx)
    }

    /// Enqueue `action` without waiting for room.
    pub fn submit(&self, action: Action) -> Result<ActionId, QueueError> {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancelToken::new();
        let label = action.to_string();

        if let Ok(mut pending) = self.state.pending.lock() {
            pending.insert(id, cancel.clone());
        }

        let queued = QueuedAction { id, action, cancel };
        if let Err(e) = self.sender.try_send(queued) {
            if let Ok(mut pending) = self.state.pending.lock() {
                pending.remove(&id);
            }
            let err = match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            };
            warn!("Could not queue '{}': {}", label, err);
            return Err(err);
        }

        debug!("Queued action {}: {}", id, label);
        let _ = self.events.send(ActionEvent::Queued { id, action: label });
        Ok(id)
    }

    /// Trip the token of the running action. Returns its id, if any.
    pub fn cancel_current(&self) -> Option<ActionId> {
        let current = self.state.current.lock().ok()?;
        current.as_ref().map(|(id, cancel)| {
            cancel.cancel();
            *id
        })
    }

    /// Trip the running action and everything still waiting in the queue.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = usize::from(self.cancel_current().is_some());
        if let Ok(pending) = self.state.pending.lock() {
            for cancel in pending.values() {
                cancel.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn current(&self) -> Option<ActionId> {
        self.state
            .current
            .lock()
            .ok()
            .and_then(|current| current.as_ref().map(|(id, _)| *id))
    }

    pub fn pending(&self) -> usize {
        self.state.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

async fn run_worker(
    handler: Arc<dyn ActionHandler>,
    mut receiver: mpsc::Receiver<QueuedAction>,
    events: mpsc::UnboundedSender<ActionEvent>,
    state: Arc<QueueState>,
) {
    while let Some(QueuedAction { id, action, cancel }) = receiver.recv().await {
        state.start(id, &cancel);

        if cancel.is_cancelled() {
            state.finish();
            let _ = events.send(ActionEvent::Cancelled { id });
            continue;
        }

        let label = action.to_string();
        info!("Starting action {}: {}", id, label);
        let _ = events.send(ActionEvent::Started {
            id,
            action: label.clone(),
        });

        let progress_events = events.clone();
        let progress = move |message: String| {
            let _ = progress_events.send(ActionEvent::Progress { id, message });
        };

        let result = handler.handle(action, &cancel, &progress).await;
        state.finish();

        let event = match result {
            Ok(_) if cancel.is_cancelled() => {
                info!("Action {} ({}) stopped on request", id, label);
                ActionEvent::Cancelled { id }
            }
            Ok(outcome) => {
                info!("Action {} ({}) finished: {}", id, label, outcome);
                ActionEvent::Finished { id, outcome }
            }
            Err(e) => {
                let kind = classify(&e);
                error!("Action {} ({}) failed [{}]: {:#}", id, label, kind, e);
                ActionEvent::Failed {
                    id,
                    kind,
                    message: format!("{:#}", e),
                }
            }
        };
        let _ = events.send(event);
    }
    info!("Action worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Records concurrency and can hold each action until released.
    #[derive(Default)]
    struct RecordingHandler {
        running: AtomicUsize,
        max_running: AtomicUsize,
        seen: Mutex<Vec<Action>>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl ActionHandler for RecordingHandler {
        async fn handle(
            &self,
            action: Action,
            cancel: &CancelToken,
            progress: Progress<'_>,
        ) -> anyhow::Result<ActionOutcome> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().unwrap().push(action.clone());
            progress(format!("working on {}", action));

            if let Some(gate) = &self.gate {
                tokio::select! {
                    _ = gate.notified() => {}
                    _ = cancel.cancelled() => {}
                }
            } else {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            match action {
                Action::CloseSession => Err(crate::config::ConfigError::Missing("LINKEDIN_EMAIL").into()),
                _ => Ok(ActionOutcome::Session {
                    open: true,
                    changed: true,
                }),
            }
        }
    }

    async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<ActionEvent>) -> ActionEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_actions_run_one_at_a_time_in_order() {
        let handler = Arc::new(RecordingHandler::default());
        let (queue, mut rx) = ActionQueue::spawn(handler.clone(), 8);

        let first = queue.submit(Action::OpenSession).unwrap();
        let second = queue.submit(Action::ScrollFeed { max_scrolls: 3 }).unwrap();
        let third = queue.submit(Action::RunPlans).unwrap();

        for expected in [first, second, third] {
            assert_eq!(next_terminal(&mut rx).await.id(), expected);
        }
        assert_eq!(handler.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec![Action::OpenSession, Action::ScrollFeed { max_scrolls: 3 }, Action::RunPlans]
        );
    }

    #[tokio::test]
    async fn test_events_include_progress_and_failures() {
        let (queue, mut rx) = ActionQueue::spawn(Arc::new(RecordingHandler::default()), 4);
        let id = queue.submit(Action::CloseSession).unwrap();

        let mut kinds = Vec::new();
        loop {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.id(), id);
            let done = matches!(event, ActionEvent::Failed { .. });
            kinds.push(event);
            if done {
                break;
            }
        }
        assert!(matches!(kinds[0], ActionEvent::Queued { .. }));
        assert!(matches!(kinds[1], ActionEvent::Started { .. }));
        assert!(matches!(&kinds[2], ActionEvent::Progress { message, .. } if message.contains("close session")));
        assert!(matches!(kinds[3], ActionEvent::Failed { kind: ErrorKind::Config, .. }));
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let gate = Arc::new(Notify::new());
        let handler = Arc::new(RecordingHandler {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let (queue, mut rx) = ActionQueue::spawn(handler, 1);

        let running = queue.submit(Action::OpenSession).unwrap();
        // wait until the worker has taken the first action off the queue
        while queue.current() != Some(running) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        queue.submit(Action::RunPlans).unwrap();
        assert_eq!(queue.submit(Action::RunPlans), Err(QueueError::Full));

        gate.notify_one();
        assert!(matches!(next_terminal(&mut rx).await, ActionEvent::Finished { .. }));
        gate.notify_one();
        assert!(matches!(next_terminal(&mut rx).await, ActionEvent::Finished { .. }));
    }

    #[tokio::test]
    async fn test_cancel_all_stops_current_and_skips_pending() {
        let gate = Arc::new(Notify::new());
        let handler = Arc::new(RecordingHandler {
            gate: Some(gate),
            ..Default::default()
        });
        let (queue, mut rx) = ActionQueue::spawn(handler.clone(), 4);

        let running = queue.submit(Action::ScrollFeed { max_scrolls: 50 }).unwrap();
        while queue.current() != Some(running) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let waiting = queue.submit(Action::RunPlans).unwrap();

        assert_eq!(queue.cancel_all(), 2);
        assert_eq!(next_terminal(&mut rx).await, ActionEvent::Cancelled { id: running });
        assert_eq!(next_terminal(&mut rx).await, ActionEvent::Cancelled { id: waiting });
        assert_eq!(handler.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_current_without_work() {
        let (queue, _rx) = ActionQueue::spawn(Arc::new(RecordingHandler::default()), 2);
        assert_eq!(queue.cancel_current(), None);
        assert_eq!(queue.pending(), 0);
    }
}
