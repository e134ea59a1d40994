// src/scheduler/mod.rs
//! Timed notification runs.
//!
//! The scheduler only decides *when*. At each daily time it submits
//! [`Action::RunPlans`] to the action queue, and the plans execute on the
//! queue worker like any other browser action.

pub mod notifier;
pub mod plans;
pub mod schedule;

use chrono::Local;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::tasks::{Action, ActionQueue, CancelToken};

pub use notifier::{NotificationPayload, Notifier};
pub use plans::load_plans;
pub use schedule::Schedule;

pub struct SchedulerHandle {
    cancel: CancelToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn spawn(queue: ActionQueue, schedule: Schedule, run_on_start: bool) -> Self {
        let cancel = CancelToken::new();
        let task = tokio::spawn(run_schedule(queue, schedule, run_on_start, cancel.clone()));
        Self { cancel, task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop scheduling. Plans already queued still run.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
        info!("Stopping scheduled notifications");
    }
}

fn submit_plans(queue: &ActionQueue) {
    match queue.submit(Action::RunPlans) {
        Ok(id) => info!("Queued scheduled plan run as action {}", id),
        Err(e) => warn!("Skipping scheduled plan run: {}", e),
    }
}

async fn run_schedule(queue: ActionQueue, schedule: Schedule, run_on_start: bool, cancel: CancelToken) {
    if run_on_start {
        submit_plans(&queue);
    }

    loop {
        let now = Local::now().naive_local();
        let next = schedule.next_after(now);
        let delay = schedule.delay_until_next(now);
        info!(
            "Next scheduled run at {} (in {:.2} minutes)",
            next.format("%Y-%m-%d %H:%M"),
            delay.as_secs_f64() / 60.0
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => submit_plans(&queue),
            _ = cancel.cancelled() => break,
        }
    }
}
