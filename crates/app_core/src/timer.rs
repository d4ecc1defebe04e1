//! Cancellable delayed actions for debounce and idle timeouts

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

/// A single-shot timer that runs an action after a delay
///
/// Arming replaces whatever was armed before; disarming cancels it.
/// Clones share the same timer.
#[derive(Clone, Default)]
pub struct DelayedAction {
    armed: Arc<Mutex<Option<AbortHandle>>>,
}

impl DelayedAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay` unless re-armed or disarmed first
    pub fn arm<F>(&self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });

        let previous = self.armed.lock().replace(task.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Cancel the armed action; returns whether one was armed
    pub fn disarm(&self) -> bool {
        match self.armed.lock().take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Whether an action is armed and has not fired yet
    pub fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
