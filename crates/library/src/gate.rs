use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

pub const DEFAULT_CONCURRENCY: usize = 50;

/// Caps the number of filesystem operations in flight.
///
/// A permit covers exactly one leaf operation. Callers must not hold one while
/// awaiting other gated work, otherwise nested fan-out could starve itself.
#[derive(Clone, Debug)]
pub struct IoGate {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl IoGate {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn run<F: Future>(&self, op: F) -> F::Output {
        // The semaphore is never closed, so acquire only fails in theory.
        let _permit = self.permits.acquire().await.ok();
        op.await
    }
}

impl Default for IoGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}
