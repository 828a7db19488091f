//! Background bootstrap retry worker.
//!
//! # Design Decisions
//! - One worker per engine; the engine refuses to spawn a second while one runs
//! - The worker sleeps without holding any lock and re-checks cancellation after waking
//! - Cancellation is a per-worker `Shutdown`, so a later `init` can start a fresh worker

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;
use crate::resilience::Backoff;

/// Outcome of one retry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Succeeded,
    Failed,
    /// The target went away; stop without further attempts.
    Abandoned,
}

pub struct RetryWorker {
    shutdown: Arc<Shutdown>,
    handle: JoinHandle<()>,
}

impl RetryWorker {
    /// Spawn a worker calling `attempt(n)` after each backoff delay until it
    /// stops returning `Attempt::Failed` or the worker is cancelled.
    pub fn spawn<F, Fut>(mut backoff: Backoff, mut attempt: F) -> Self
    where
        F: FnMut(u32) -> Fut + Send + 'static,
        Fut: Future<Output = Attempt> + Send + 'static,
    {
        let shutdown = Arc::new(Shutdown::new());
        let mut cancelled = shutdown.subscribe();
        let flag = shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                let delay = backoff.next_delay();
                tracing::debug!(attempt = backoff.attempt(), delay_ms = delay.as_millis() as u64, "Retry scheduled");
                tokio::select! {
                    _ = cancelled.recv() => {
                        tracing::debug!("Retry worker cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                if flag.is_triggered() {
                    return;
                }
                match attempt(backoff.attempt()).await {
                    Attempt::Failed => continue,
                    Attempt::Succeeded | Attempt::Abandoned => return,
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Request cancellation. An attempt already running completes first.
    pub fn cancel(&self) {
        self.shutdown.trigger();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
