//! Fixed-delay changelog scheduling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::poller::ChangelogAuditPoller;

/// Runs a [`ChangelogAuditPoller`] on a background task.
///
/// The first pass starts after `initial_delay`; every later pass starts
/// `period` after the previous one finished, so passes never overlap.
pub struct ChangelogScheduler;

impl ChangelogScheduler {
    /// Spawns the polling loop. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(
        poller: Arc<ChangelogAuditPoller>,
        initial_delay: Duration,
        period: Duration,
    ) -> SchedulerHandle {
        let (shutdown, mut stopped) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::info!(
                initial_delay_ms = initial_delay.as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "changelog scheduler started"
            );

            let mut delay = initial_delay;
            loop {
                tokio::select! {
                    () = sleep(delay) => {}
                    _ = stopped.changed() => break,
                }

                let summary = poller.poll_all().await;
                if summary.has_failures() {
                    tracing::warn!(failed = summary.sources_failed, "changelog pass had failing sources");
                }
                delay = period;
            }

            tracing::info!("changelog scheduler stopped");
        });

        SchedulerHandle {
            shutdown,
            task: Some(task),
        }
    }
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stops the loop, letting a pass in progress finish first.
    pub async fn stop(mut self) {
        // Send fails only if the task already exited.
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "changelog scheduler panicked");
            }
        }
    }

    /// Returns true once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}
