//! Periodic removal of stale session tokens.
//!
//! The reaper is owned by whoever starts it: [`spawn_token_reaper`] returns a
//! [`ReaperHandle`] and the task runs until [`ReaperHandle::stop`] is awaited
//! or the handle is dropped.

use super::manager::TokenManager;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info};

/// Default pause between sweeps.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
pub struct ReaperHandle {
    stop: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the task and wait for the current sweep to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the task panicked.
    pub async fn stop(self) -> Result<()> {
        // A closed channel means the task is already gone.
        let _ = self.stop.send(()).await;
        self.task.await.context("token reaper task failed")
    }
}

/// Start sweeping every `every`; the first sweep runs immediately.
///
/// Sweep failures are logged and the loop carries on.
#[must_use]
pub fn spawn_token_reaper(manager: TokenManager, every: Duration) -> ReaperHandle {
    let every = if every.is_zero() {
        Duration::from_secs(1)
    } else {
        every
    };
    let (stop, mut stopped) = mpsc::channel::<()>(1);

    let task = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_seconds = every.as_secs(), "token reaper started");

        loop {
            tokio::select! {
                _ = stopped.recv() => break,
                _ = ticker.tick() => match manager.reap_expired().await {
                    Ok(0) => debug!("no stale session tokens"),
                    Ok(reaped) => info!(reaped, "stale session tokens reaped"),
                    Err(err) => error!("Failed to reap session tokens: {err:#}"),
                },
            }
        }

        info!("token reaper stopped");
    });

    ReaperHandle { stop, task }
}
