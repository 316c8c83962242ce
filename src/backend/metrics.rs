//! Cumulative counters for backend calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Counters for monitoring backend traffic.
#[derive(Debug, Default)]
pub struct ClientMetrics {
    /// Successful batch calls
    pub total_batches: AtomicU64,

    /// Texts translated by successful calls
    pub total_requests: AtomicU64,

    /// Tokens reported by the backend
    pub total_tokens: AtomicU64,

    /// Failed attempts, including ones that were later retried
    pub total_errors: AtomicU64,

    /// Retry attempts issued
    pub total_retries: AtomicU64,

    /// Wall time of successful calls in microseconds (for averaging)
    pub total_process_us: AtomicU64,
}

impl ClientMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful batch call
    pub fn record_success(&self, batch_size: usize, tokens: u64, elapsed: Duration) {
        self.total_batches.fetch_add(1, Ordering::Relaxed);
        self.total_requests.fetch_add(batch_size as u64, Ordering::Relaxed);
        self.total_tokens.fetch_add(tokens, Ordering::Relaxed);
        self.total_process_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Average successful call time in milliseconds
    pub fn avg_process_time_ms(&self) -> f64 {
        let batches = self.total_batches.load(Ordering::Relaxed);
        if batches == 0 {
            return 0.0;
        }
        self.total_process_us.load(Ordering::Relaxed) as f64 / 1000.0 / batches as f64
    }

    pub fn avg_batch_size(&self) -> f64 {
        let batches = self.total_batches.load(Ordering::Relaxed);
        if batches == 0 {
            return 0.0;
        }
        self.total_requests.load(Ordering::Relaxed) as f64 / batches as f64
    }

    /// Errors per successful batch
    pub fn error_rate(&self) -> f64 {
        let batches = self.total_batches.load(Ordering::Relaxed);
        if batches == 0 {
            return 0.0;
        }
        self.total_errors.load(Ordering::Relaxed) as f64 / batches as f64
    }

    pub fn snapshot(&self) -> ClientMetricsSnapshot {
        ClientMetricsSnapshot {
            total_batches: self.total_batches.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
            avg_process_time_ms: self.avg_process_time_ms(),
            avg_batch_size: self.avg_batch_size(),
            error_rate: self.error_rate(),
        }
    }

    pub fn reset(&self) {
        self.total_batches.store(0, Ordering::Relaxed);
        self.total_requests.store(0, Ordering::Relaxed);
        self.total_tokens.store(0, Ordering::Relaxed);
        self.total_errors.store(0, Ordering::Relaxed);
        self.total_retries.store(0, Ordering::Relaxed);
        self.total_process_us.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of backend counters at a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientMetricsSnapshot {
    pub total_batches: u64,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_errors: u64,
    pub total_retries: u64,
    pub avg_process_time_ms: f64,
    pub avg_batch_size: f64,
    pub error_rate: f64,
}
