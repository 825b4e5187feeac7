//! Idle-slice scheduling.
//!
//! Long work is cut into fixed-size units; after each unit the worker hands
//! the thread back to the runtime and resumes on the next scheduling
//! opportunity. A [`StopSignal`] lets the owner interrupt at those
//! boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Yields between units of work
#[derive(Debug, Clone)]
pub struct IdleScheduler {
    /// Pause between slices; zero means a plain yield
    delay: Duration,
    slices: u64,
}

impl IdleScheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay, slices: 0 }
    }

    /// Give the thread back until the next slice may run
    pub async fn next_slice(&mut self) {
        self.slices += 1;
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
    }

    /// Slices handed back so far
    pub fn slices(&self) -> u64 {
        self.slices
    }
}

impl Default for IdleScheduler {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

/// One-shot stop request shared between an owner and its workers
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Stop requested");
        }
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once `stop` has been called
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent stop is not lost
        notified.as_mut().enable();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}
