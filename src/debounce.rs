//! Cancelable trailing-edge debounce.
//!
//! Collapses rapid repeated triggers into one delayed run of an action. Each
//! trigger cancels the pending timer and reschedules from zero, so the action
//! runs only after a full quiet window.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// A debounce handle owning at most one pending timer.
///
/// Must be used from within a tokio runtime; the pending action runs on a
/// spawned task.
#[derive(Debug, Default)]
pub struct Debounce {
    pending: Option<JoinHandle<()>>,
}

impl Debounce {
    #[must_use]
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Schedule `action` to run after `delay`, replacing any pending run.
    pub fn trigger<F, Fut>(&mut self, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            sleep(delay).await;
            action().await;
        }));
    }

    /// Discard any pending timer without running the action. Safe to call
    /// when nothing is pending.
    pub fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }

    /// Whether a trigger is scheduled and has not yet fired.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Debounce {
    fn drop(&mut self) {
        self.cancel();
    }
}
