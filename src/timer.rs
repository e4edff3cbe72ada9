//! One-shot timers for probe and registration timeouts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

/// Runs a callback once after a delay unless aborted first.
///
/// Dropping the timer aborts it. A callback that has already started is
/// allowed to finish; one that has not started never runs once [`abort`]
/// returns. [`stop`] additionally waits for a running callback.
///
/// [`abort`]: Timer::abort
/// [`stop`]: Timer::stop
#[derive(Debug)]
pub struct Timer {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Timer {
    /// Schedule `callback` on the current tokio runtime.
    ///
    /// Outside a runtime the timer is inert and the callback is dropped.
    pub fn start<F>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = match Handle::try_current() {
            Ok(runtime) => {
                let flag = Arc::clone(&cancelled);
                Some(runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if !flag.load(Ordering::Acquire) {
                        callback();
                    }
                }))
            }
            Err(_) => {
                warn!(?delay, "no async runtime, timer disabled");
                None
            }
        };
        Self { cancelled, task }
    }

    /// An inert timer that never fires.
    pub fn disabled() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(true)),
            task: None,
        }
    }

    /// Cancel the timer. Safe to call repeatedly.
    pub fn abort(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Cancel the timer and wait until its callback is no longer running.
    pub async fn stop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
            // Cancelled or finished, both mean the callback is done.
            let _ = task.await;
        }
    }

    /// Still waiting to fire.
    pub fn is_pending(&self) -> bool {
        !self.cancelled.load(Ordering::Acquire)
            && self.task.as_ref().map_or(false, |task| !task.is_finished())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.abort();
    }
}
