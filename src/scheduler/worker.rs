//! Worker loop: collect a batch, process it, record metrics, repeat.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::batch::{BatchCollector, BatchResult};
use crate::error::BatchError;
use crate::telemetry::MetricsCollector;

/// Pause after a failed batch before collecting again.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Run one worker until `shutdown` fires. A batch that has already been
/// collected is always processed before the worker exits.
pub async fn run_worker(
    id: usize,
    collector: Arc<BatchCollector>,
    metrics: Arc<MetricsCollector>,
    error_backoff: Duration,
    shutdown: CancellationToken,
) {
    tracing::debug!(worker = id, "batch_worker_started");
    while !shutdown.is_cancelled() {
        match collector.collect_and_process_until(&shutdown).await {
            Ok(Some(result)) => record_success(&collector, &metrics, &result),
            Ok(None) => {}
            Err(err) => {
                record_failure(&metrics, &err);
                tracing::error!(worker = id, error = %err, "batch_worker_error");
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(error_backoff) => {}
                }
            }
        }
    }
    tracing::info!(worker = id, "batch_worker_stopped");
}

fn record_success(collector: &BatchCollector, metrics: &MetricsCollector, result: &BatchResult) {
    let queue_depth = collector.queue().len();
    for (tier, count) in &result.tier_breakdown {
        for _ in 0..*count {
            metrics.record_request(*tier, result.total_time_ms, result.batch_size, queue_depth);
        }
    }
    metrics.record_batch(result.batch_size);
}

fn record_failure(metrics: &MetricsCollector, err: &BatchError) {
    let batch_size = match err {
        BatchError::Inference { batch_size, .. } => *batch_size,
        BatchError::EmptyBatch => 0,
    };
    metrics.record_failed_batch(batch_size);
}
