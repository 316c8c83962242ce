//! Tier-aware batch collection and processing.
//!
//! A batch takes its policy and language pair from its first request, then
//! keeps pulling from the queue until it hits the effective size ceiling,
//! the tier's max wait, a language mismatch, or a much more urgent request
//! waiting behind it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

use super::queue::TranslationQueue;
use super::request::{TranslationOutput, TranslationRequest};
use crate::backend::InferenceBackend;
use crate::error::{BatchError, TranslationError};
use crate::telemetry::{self, BatchSpan, SpanExt};
use crate::tier::{Tier, TierConfig};

/// Configuration for batch collection.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Shrink the ceiling toward `min_batch_size` when the queue is shallow.
    pub adaptive_sizing: bool,
    /// How long to wait for the first request of a batch.
    pub idle_timeout: Duration,
    /// Upper bound on each follow-up poll.
    pub poll_interval: Duration,
    /// Pause after an empty poll while still under `min_batch_size`.
    pub min_fill_sleep: Duration,
    /// Score gap by which the queue head must beat the batch's first
    /// request to cut collection short.
    pub interrupt_margin: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            adaptive_sizing: true,
            idle_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            min_fill_sleep: Duration::from_millis(5),
            interrupt_margin: 1.0,
        }
    }
}

/// Ceiling for a batch given its tier policy and the queue depth seen after
/// the first request was taken.
pub fn effective_max_batch_size(config: &TierConfig, adaptive: bool, queue_depth: usize) -> usize {
    if adaptive {
        config
            .max_batch_size
            .min(config.min_batch_size.max(queue_depth + 1))
    } else {
        config.max_batch_size
    }
}

/// Outcome of one processed batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// Tier of the request that opened the batch.
    pub tier: Tier,
    pub source_lang: String,
    pub target_lang: String,
    /// In the same order as the batch's requests.
    pub translations: Vec<String>,
    pub batch_size: usize,
    /// From the first request's enqueue to the backend call.
    pub collect_time_ms: f64,
    pub process_time_ms: f64,
    /// From the first request's enqueue to the backend reply.
    pub total_time_ms: f64,
    pub tier_breakdown: BTreeMap<Tier, usize>,
}

/// Cumulative collector counters.
#[derive(Debug, Default)]
pub struct BatcherMetrics {
    batches_processed: AtomicU64,
    batches_failed: AtomicU64,
    total_requests_processed: AtomicU64,
    total_collect_us: AtomicU64,
    total_process_us: AtomicU64,
    priority_interruptions: AtomicU64,
    language_splits: AtomicU64,
}

impl BatcherMetrics {
    fn record_processed(&self, batch_size: usize, collect_ms: f64, process_ms: f64) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.total_requests_processed
            .fetch_add(batch_size as u64, Ordering::Relaxed);
        self.total_collect_us
            .fetch_add((collect_ms * 1000.0) as u64, Ordering::Relaxed);
        self.total_process_us
            .fetch_add((process_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BatcherMetricsSnapshot {
        let batches = self.batches_processed.load(Ordering::Relaxed);
        let requests = self.total_requests_processed.load(Ordering::Relaxed);
        let per_batch_ms = |total_us: u64| {
            if batches == 0 {
                0.0
            } else {
                round2(total_us as f64 / 1000.0 / batches as f64)
            }
        };
        BatcherMetricsSnapshot {
            batches_processed: batches,
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            total_requests_processed: requests,
            avg_batch_size: if batches == 0 { 0.0 } else { round2(requests as f64 / batches as f64) },
            avg_collect_time_ms: per_batch_ms(self.total_collect_us.load(Ordering::Relaxed)),
            avg_process_time_ms: per_batch_ms(self.total_process_us.load(Ordering::Relaxed)),
            priority_interruptions: self.priority_interruptions.load(Ordering::Relaxed),
            language_splits: self.language_splits.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.batches_processed,
            &self.batches_failed,
            &self.total_requests_processed,
            &self.total_collect_us,
            &self.total_process_us,
            &self.priority_interruptions,
            &self.language_splits,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatcherMetricsSnapshot {
    pub batches_processed: u64,
    pub batches_failed: u64,
    pub total_requests_processed: u64,
    pub avg_batch_size: f64,
    pub avg_collect_time_ms: f64,
    pub avg_process_time_ms: f64,
    pub priority_interruptions: u64,
    pub language_splits: u64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn millis_between(from: Instant, to: Instant) -> f64 {
    to.saturating_duration_since(from).as_secs_f64() * 1000.0
}

/// Pulls batches off the shared queue and runs them through the backend.
pub struct BatchCollector {
    queue: Arc<TranslationQueue>,
    backend: Arc<dyn InferenceBackend>,
    config: BatchConfig,
    metrics: BatcherMetrics,
}

impl BatchCollector {
    pub fn new(
        queue: Arc<TranslationQueue>,
        backend: Arc<dyn InferenceBackend>,
        config: BatchConfig,
    ) -> Self {
        Self {
            queue,
            backend,
            config,
            metrics: BatcherMetrics::default(),
        }
    }

    pub fn queue(&self) -> &Arc<TranslationQueue> {
        &self.queue
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Collect one batch. Empty when nothing arrived within the idle timeout.
    pub async fn collect_batch(&self) -> Vec<TranslationRequest> {
        match self.queue.get(self.config.idle_timeout).await {
            Some(first) => self.fill_batch(first).await,
            None => Vec::new(),
        }
    }

    /// Like `collect_batch`, but gives up waiting for a first request when
    /// `shutdown` fires. Once a request is taken the batch is always filled.
    pub async fn collect_batch_until(&self, shutdown: &CancellationToken) -> Vec<TranslationRequest> {
        let first = tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            first = self.queue.get(self.config.idle_timeout) => first,
        };
        match first {
            Some(first) => self.fill_batch(first).await,
            None => Vec::new(),
        }
    }

    async fn fill_batch(&self, first: TranslationRequest) -> Vec<TranslationRequest> {
        let tier_config = *self.queue.tiers().get(first.tier);
        let effective_max =
            effective_max_batch_size(&tier_config, self.config.adaptive_sizing, self.queue.len());
        let max_wait = Duration::from_millis(tier_config.max_wait_ms);
        let started = Instant::now();

        let mut batch = Vec::with_capacity(effective_max);
        batch.push(first);

        while batch.len() < effective_max {
            let remaining = max_wait.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }

            if batch.len() >= tier_config.min_batch_size && self.should_interrupt(&batch[0]).await {
                break;
            }

            match self.queue.get(remaining.min(self.config.poll_interval)).await {
                None => {
                    if batch.len() >= tier_config.min_batch_size {
                        break;
                    }
                    let left = max_wait.saturating_sub(started.elapsed());
                    tokio::time::sleep(self.config.min_fill_sleep.min(left)).await;
                }
                Some(next) if next.same_pair(&batch[0]) => batch.push(next),
                Some(next) => {
                    self.metrics.language_splits.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        batch_size = batch.len(),
                        batch_pair = %format!("{}->{}", batch[0].source_lang, batch[0].target_lang),
                        next_pair = %format!("{}->{}", next.source_lang, next.target_lang),
                        "language_split"
                    );
                    self.queue.requeue(next).await;
                    break;
                }
            }
        }

        batch
    }

    /// Whether the queue head outranks the batch's first request by more
    /// than the interrupt margin.
    async fn should_interrupt(&self, first: &TranslationRequest) -> bool {
        let Some(head) = self.queue.peek_priority().await else {
            return false;
        };
        let current = first.score(self.queue.tiers(), self.queue.boost_rate(), Instant::now());
        if head < current - self.config.interrupt_margin {
            self.metrics.priority_interruptions.fetch_add(1, Ordering::Relaxed);
            debug!(
                batch_tier = %first.tier,
                batch_priority = current,
                next_priority = head,
                "priority_interruption"
            );
            return true;
        }
        false
    }

    /// Run one batch through the backend. Result slots are left untouched.
    pub async fn process_batch(&self, batch: &[TranslationRequest]) -> Result<BatchResult, BatchError> {
        let first = batch.first().ok_or(BatchError::EmptyBatch)?;
        let tier = first.tier;
        let batch_size = batch.len();

        let mut tier_breakdown = BTreeMap::new();
        for request in batch {
            *tier_breakdown.entry(request.tier).or_insert(0) += 1;
        }
        let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();

        let span = BatchSpan::new(tier, batch_size, &first.source_lang, &first.target_lang);
        let process_start = Instant::now();
        let outcome = self
            .backend
            .translate_batch(&texts, &first.source_lang, &first.target_lang)
            .instrument(span.clone())
            .await
            .and_then(|translations| {
                if translations.len() == batch_size {
                    Ok(translations)
                } else {
                    Err(TranslationError::permanent(
                        format!("backend returned {} translations for {batch_size} texts", translations.len()),
                        None,
                    ))
                }
            });
        let process_end = Instant::now();
        let process_time_ms = millis_between(process_start, process_end);
        span.record("process_ms", process_time_ms);
        span.record_result(&outcome);

        let translations = match outcome {
            Ok(translations) => translations,
            Err(source) => {
                self.metrics.batches_failed.fetch_add(1, Ordering::Relaxed);
                telemetry::record_batch_failure(tier, batch_size);
                return Err(BatchError::Inference { batch_size, source });
            }
        };

        let result = BatchResult {
            tier,
            source_lang: first.source_lang.clone(),
            target_lang: first.target_lang.clone(),
            translations,
            batch_size,
            collect_time_ms: millis_between(first.enqueued_at, process_start),
            process_time_ms,
            total_time_ms: millis_between(first.enqueued_at, process_end),
            tier_breakdown,
        };

        self.metrics
            .record_processed(batch_size, result.collect_time_ms, result.process_time_ms);
        telemetry::record_batch_success(tier, batch_size, process_time_ms);
        info!(
            batch_size,
            tier = %tier,
            collect_ms = round2(result.collect_time_ms),
            process_ms = round2(result.process_time_ms),
            total_ms = round2(result.total_time_ms),
            tiers = ?result.tier_breakdown,
            "batch_processed"
        );

        Ok(result)
    }

    /// Collect a batch, process it, and deliver every request's result.
    /// On failure each request receives the same error.
    pub async fn collect_and_process(&self) -> Result<Option<BatchResult>, BatchError> {
        let batch = self.collect_batch().await;
        self.dispatch(batch).await
    }

    /// `collect_and_process` that stops waiting for work on shutdown.
    pub async fn collect_and_process_until(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<Option<BatchResult>, BatchError> {
        let batch = self.collect_batch_until(shutdown).await;
        self.dispatch(batch).await
    }

    async fn dispatch(&self, mut batch: Vec<TranslationRequest>) -> Result<Option<BatchResult>, BatchError> {
        if batch.is_empty() {
            return Ok(None);
        }

        match self.process_batch(&batch).await {
            Ok(result) => {
                for (request, translation) in batch.iter_mut().zip(&result.translations) {
                    let output = TranslationOutput {
                        translation: translation.clone(),
                        source_lang: request.source_lang.clone(),
                        target_lang: request.target_lang.clone(),
                        latency_ms: result.total_time_ms,
                        batch_size: result.batch_size,
                        request_id: request.request_id.clone(),
                    };
                    let _ = request.resolve(Ok(output));
                }
                Ok(Some(result))
            }
            Err(err) => {
                error!(error = %err, batch_size = batch.len(), "batch_processing_failed");
                if let BatchError::Inference { source, .. } = &err {
                    for request in batch.iter_mut() {
                        let _ = request.resolve(Err(source.clone()));
                    }
                }
                Err(err)
            }
        }
    }

    pub fn metrics(&self) -> BatcherMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
