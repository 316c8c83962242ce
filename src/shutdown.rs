//! Worker pool lifecycle and graceful drain.
//!
//! Workers share one cancellation token. Each holds an `ActivityGuard` for
//! its whole life, so shutdown can wait for the active count to reach zero
//! and abort whatever is still running when the grace period ends.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    /// Grace period ran out; `remaining` workers were aborted.
    Timeout { remaining: usize },
}

/// Shared count of live workers.
#[derive(Debug, Clone, Default)]
pub struct ActivityTracker {
    count: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self) -> ActivityGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            counter: self.count.clone(),
            notify: self.notify.clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until no guard is alive, or `timeout` elapses.
    pub async fn wait_idle(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let count = self.count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            let remaining_time = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining_time.is_zero() {
                return ShutdownResult::Timeout { remaining: count };
            }

            tokio::select! {
                _ = self.notify.notified() => continue,
                _ = tokio::time::sleep(remaining_time) => {
                    let final_count = self.count();
                    if final_count == 0 {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout { remaining: final_count };
                }
            }
        }
    }
}

/// RAII guard for one live worker.
pub struct ActivityGuard {
    counter: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

/// A set of worker tasks sharing one shutdown token.
pub struct WorkerPool {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    tracker: ActivityTracker,
}

impl WorkerPool {
    pub fn new(tracker: ActivityTracker) -> Self {
        Self {
            token: CancellationToken::new(),
            handles: Vec::new(),
            tracker,
        }
    }

    /// Spawn a worker. The guard is taken before the task starts so a
    /// shutdown racing with startup still waits for it.
    pub fn spawn<F, Fut>(&mut self, make: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let guard = self.tracker.track();
        let work = make(self.token.clone());
        self.handles.push(tokio::spawn(async move {
            let _guard = guard;
            work.await;
        }));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every worker to stop without waiting for them.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel every worker, wait up to `timeout`, then abort stragglers.
    pub async fn shutdown(self, timeout: Duration) -> ShutdownResult {
        self.token.cancel();
        let result = self.tracker.wait_idle(timeout).await;

        match result {
            ShutdownResult::Complete => {
                for handle in self.handles {
                    let _ = handle.await;
                }
                info!("worker_pool_stopped");
            }
            ShutdownResult::Timeout { remaining } => {
                warn!(remaining, timeout_ms = timeout.as_millis() as u64, "worker_pool_shutdown_timeout");
                for handle in &self.handles {
                    handle.abort();
                }
                for handle in self.handles {
                    let _ = handle.await;
                }
            }
        }
        result
    }
}
