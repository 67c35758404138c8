//! Write coalescing for rapid consecutive edits.
//!
//! Title and content edits are persisted through a fixed-delay debouncer so
//! a burst of keystrokes collapses into one save. Each new call cancels and
//! replaces the pending one; owners must [`Debouncer::cancel`] on unmount so
//! no late write lands against a stale slug.

use std::sync::Mutex;

use log::warn;
use tokio::{task::JoinHandle, time::Duration};

/// Coalesces calls into a single delayed action.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedules `action` to run after the delay, cancelling any previously
    /// scheduled action. Must be called from within a tokio runtime.
    pub fn call<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });

        match self.pending.lock() {
            Ok(mut pending) => {
                if let Some(previous) = pending.replace(task) {
                    previous.abort();
                }
            }
            Err(_) => {
                warn!("Debouncer state poisoned; cancelling the new task");
                task.abort();
            }
        }
    }

    /// Cancels the pending action, if any. Safe to call repeatedly.
    pub fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(task) = pending.take() {
                task.abort();
            }
        }
    }

    /// Whether an action is still waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|p| p.as_ref().is_some_and(|task| !task.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[tokio::test(start_paused = true)]
    async fn a_burst_of_calls_fires_once() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let count = Arc::clone(&count);
            debouncer.call(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_pending_write() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        debouncer.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(debouncer.is_pending());
        debouncer.cancel();

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn later_calls_replace_earlier_ones() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            debouncer.call(move || {
                seen.lock().unwrap().push(label);
            });
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["third"]);
    }
}
