use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Runs a deferred task at most once per window.
///
/// The first `schedule` call arms a timer; calls made while it is armed are
/// folded into that run. `cancel` disarms it so the owner can run the work
/// itself, which is how a pending save becomes a deterministic flush on exit.
pub struct Debouncer {
    delay: Duration,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms the timer unless it already is. Returns `false` when no tokio
    /// runtime is available; the caller then has to run the work explicitly.
    pub fn schedule<F, Fut>(&self, task: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if pending.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return true;
        }
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => return false,
        };

        let slot = Arc::clone(&self.pending);
        let delay = self.delay;
        *pending = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            // Leave the slot before running so a later cancel cannot abort a write.
            slot.lock().take();
            task().await;
        }));
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Disarms the timer. Returns whether a run was actually pending.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) => {
                let was_pending = !handle.is_finished();
                handle.abort();
                was_pending
            }
            None => false,
        }
    }
}
