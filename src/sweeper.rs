//! Periodic expiry sweeps for the in-memory stores.
//!
//! Sweeping only bounds memory. Lookups check expiry themselves, so a sweep
//! racing a lookup is harmless.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shortest period a sweeper runs at.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// A store whose expired entries can be purged.
pub trait Sweep: Send + Sync + 'static {
    /// Short label used in log fields.
    fn name(&self) -> &'static str;

    /// Removes expired entries and returns how many were dropped.
    fn sweep(&self) -> usize;
}

/// Handle to a running sweep task.
///
/// The task holds only a weak reference to its store and exits once the
/// store is dropped. Dropping the handle aborts the task; call
/// [`shutdown`](Self::shutdown) to stop it and wait for it to finish.
pub struct Sweeper {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawns a sweep of `store` every `period` on the current tokio runtime.
    ///
    /// The first sweep runs one full `period` after start. Periods below
    /// [`MIN_PERIOD`] are raised to it.
    #[must_use]
    pub fn start<S: Sweep>(store: &Arc<S>, period: Duration) -> Self {
        let name = store.name();
        if period < MIN_PERIOD {
            tracing::warn!(store = name, ?period, "Sweep period too short; using minimum");
        }
        let period = period.max(MIN_PERIOD);
        let weak: Weak<S> = Arc::downgrade(store);
        let (tx, mut rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() completes its first tick immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => {
                        let Some(store) = weak.upgrade() else { break };
                        let removed = store.sweep();
                        if removed > 0 {
                            tracing::debug!(store = name, removed, "Swept expired entries");
                        }
                    }
                }
            }

            tracing::debug!(store = name, "Sweeper stopped");
        });

        tracing::debug!(store = name, period_secs = period.as_secs(), "Sweeper started");

        Self {
            name,
            shutdown: Some(tx),
            task: Some(task),
        }
    }

    /// Store label this sweeper serves.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals the task to stop and waits for it.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(store = self.name, error = %e, "Sweeper task ended abnormally");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
