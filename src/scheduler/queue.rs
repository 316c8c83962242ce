//! Shared translation queue.
//!
//! One tokio mutex serializes every mutation; `get` waits on a `Notify`
//! that each `put` signals. Scores are refreshed on every dequeue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::priority::{AgingPriorityQueue, DEFAULT_BOOST_RATE};
use super::request::TranslationRequest;
use crate::error::{QueueError, TranslationError};
use crate::telemetry;
use crate::tier::{Tier, TierTable};

/// Configuration for the translation queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Score boost per second waited.
    pub boost_rate: f64,
    /// Admission limit. `None` keeps the queue unbounded.
    pub max_pending: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { boost_rate: DEFAULT_BOOST_RATE, max_pending: None }
    }
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueMetrics {
    pub size: usize,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub total_requeued: u64,
    pub total_cancelled: u64,
    pub total_rejected: u64,
    pub tier_distribution: HashMap<Tier, u64>,
}

struct Inner {
    heap: AgingPriorityQueue<TranslationRequest>,
    stats: QueueMetrics,
}

impl Inner {
    /// Pop the best live request, resolving cancelled ones on the way.
    fn pop_live(&mut self, now: Instant) -> Option<TranslationRequest> {
        while let Some(entry) = self.heap.pop_at(now) {
            let mut request = entry.item;
            if request.is_cancelled() {
                self.stats.total_cancelled += 1;
                let timeout_ms = request.wait_time().as_millis() as u64;
                let _ = request.resolve(Err(TranslationError::Timeout { timeout_ms }));
                continue;
            }
            self.stats.total_dequeued += 1;
            return Some(request);
        }
        None
    }
}

/// Priority queue of pending translation requests.
pub struct TranslationQueue {
    inner: Mutex<Inner>,
    tiers: Arc<TierTable>,
    config: QueueConfig,
    /// Wakes a waiting `get` when something is enqueued.
    notify: Notify,
    /// Mirror of the heap length, readable without the lock.
    size: AtomicUsize,
}

impl TranslationQueue {
    pub fn new(config: QueueConfig, tiers: Arc<TierTable>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: AgingPriorityQueue::new(config.boost_rate),
                stats: QueueMetrics::default(),
            }),
            tiers,
            config,
            notify: Notify::new(),
            size: AtomicUsize::new(0),
        }
    }

    pub fn tiers(&self) -> &Arc<TierTable> {
        &self.tiers
    }

    pub fn boost_rate(&self) -> f64 {
        self.config.boost_rate
    }

    /// Enqueue a new request. Only fails when a capacity limit is configured.
    pub async fn put(&self, request: TranslationRequest) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        if let Some(max) = self.config.max_pending {
            if inner.heap.len() >= max {
                inner.stats.total_rejected += 1;
                return Err(QueueError::QueueFull { max });
            }
        }
        inner.stats.total_enqueued += 1;
        *inner.stats.tier_distribution.entry(request.tier).or_insert(0) += 1;
        self.push_locked(&mut inner, request);
        drop(inner);

        self.notify.notify_one();
        Ok(())
    }

    /// Put a dequeued request back untouched. Its original enqueue instant is
    /// kept, so it does not lose the priority it has aged into.
    pub async fn requeue(&self, request: TranslationRequest) {
        let mut inner = self.inner.lock().await;
        inner.stats.total_requeued += 1;
        self.push_locked(&mut inner, request);
        drop(inner);

        self.notify.notify_one();
    }

    fn push_locked(&self, inner: &mut Inner, request: TranslationRequest) {
        let base = self.tiers.get(request.tier).priority as f64;
        let enqueued_at = request.enqueued_at;
        inner.heap.push(request, base, enqueued_at);
        let len = inner.heap.len();
        self.size.store(len, Ordering::Release);
        telemetry::record_queue_depth(len);
    }

    /// Remove the highest-priority request without waiting.
    pub async fn try_get(&self) -> Option<TranslationRequest> {
        let mut inner = self.inner.lock().await;
        let request = inner.pop_live(Instant::now());
        self.size.store(inner.heap.len(), Ordering::Release);
        request
    }

    /// Remove the highest-priority request, waiting up to `timeout` for one
    /// to arrive. Returns `None` when nothing arrived in time.
    pub async fn get(&self, timeout: Duration) -> Option<TranslationRequest> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking, so a put between the check
            // and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(request) = self.try_get().await {
                return Some(request);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Fresh score of the current head.
    pub async fn peek_priority(&self) -> Option<f64> {
        let mut inner = self.inner.lock().await;
        inner.heap.peek_at(Instant::now()).map(|(_, score)| score)
    }

    /// Tier of the current head.
    pub async fn peek_tier(&self) -> Option<Tier> {
        let mut inner = self.inner.lock().await;
        inner.heap.peek_at(Instant::now()).map(|(request, _)| request.tier)
    }

    /// Remove every pending request, best first.
    pub async fn drain(&self) -> Vec<TranslationRequest> {
        let mut inner = self.inner.lock().await;
        let drained = inner.heap.drain_ordered(Instant::now());
        self.size.store(0, Ordering::Release);
        drained
    }

    /// Current pending count.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn metrics(&self) -> QueueMetrics {
        let inner = self.inner.lock().await;
        let mut snapshot = inner.stats.clone();
        snapshot.size = inner.heap.len();
        for tier in Tier::ALL {
            snapshot.tier_distribution.entry(tier).or_insert(0);
        }
        snapshot
    }

    pub async fn reset_metrics(&self) {
        let mut inner = self.inner.lock().await;
        inner.stats = QueueMetrics::default();
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
