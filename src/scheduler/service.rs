//! Translation scheduling service.
//!
//! Owns the queue, the batch collector, the worker pool and the metrics
//! collector. Constructed and owned by the embedding application; there is
//! no global instance.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::batch::{BatchCollector, BatchConfig, BatcherMetricsSnapshot};
use super::queue::{QueueConfig, QueueMetrics, TranslationQueue};
use super::request::{TranslationOutput, TranslationRequest};
use super::worker::{run_worker, DEFAULT_ERROR_BACKOFF};
use crate::backend::{ClientMetricsSnapshot, HttpInferenceClient, InferenceBackend};
use crate::config::EnvConfig;
use crate::error::{ConfigError, TranslationError};
use crate::health::{HealthChecker, HealthConfig, ServiceHealth};
use crate::shutdown::{ActivityTracker, ShutdownResult, WorkerPool};
use crate::telemetry::{MetricsCollector, MetricsSummary, SlaStatus, DEFAULT_WINDOW_SIZE};
use crate::tier::{Tier, TierTable};

/// Service-wide configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub tiers: TierTable,
    pub queue: QueueConfig,
    pub batch: BatchConfig,
    /// Rolling window of the metrics collector, in samples.
    pub metrics_window: usize,
    /// Worker pause after a failed batch.
    pub error_backoff: Duration,
    /// Flag queued requests whose caller timed out so workers skip them.
    pub cancel_on_timeout: bool,
    pub health: HealthConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tiers: TierTable::default(),
            queue: QueueConfig::default(),
            batch: BatchConfig::default(),
            metrics_window: DEFAULT_WINDOW_SIZE,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            cancel_on_timeout: false,
            health: HealthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub workers_active: usize,
}

/// Aggregated snapshot of every component's counters.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetrics {
    pub service: ServiceStatus,
    pub queue: QueueMetrics,
    pub batcher: BatcherMetricsSnapshot,
    pub processor: ClientMetricsSnapshot,
    pub performance: MetricsSummary,
    pub sla: BTreeMap<Tier, SlaStatus>,
}

/// Tier-aware batching translation service.
pub struct TranslationService {
    queue: Arc<TranslationQueue>,
    collector: Arc<BatchCollector>,
    backend: Arc<dyn InferenceBackend>,
    metrics: Arc<MetricsCollector>,
    health: HealthChecker,
    error_backoff: Duration,
    cancel_on_timeout: bool,
    running: AtomicBool,
    pool: Mutex<Option<WorkerPool>>,
    activity: ActivityTracker,
}

impl TranslationService {
    pub fn new(config: ServiceConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        let tiers = Arc::new(config.tiers);
        let queue = Arc::new(TranslationQueue::new(config.queue, tiers.clone()));
        let collector = Arc::new(BatchCollector::new(queue.clone(), backend.clone(), config.batch));
        let metrics = Arc::new(MetricsCollector::new(config.metrics_window, tiers));

        Self {
            queue,
            collector,
            backend,
            metrics,
            health: HealthChecker::new(config.health),
            error_backoff: config.error_backoff,
            cancel_on_timeout: config.cancel_on_timeout,
            running: AtomicBool::new(false),
            pool: Mutex::new(None),
            activity: ActivityTracker::new(),
        }
    }

    /// Build a service backed by the HTTP client, from environment config.
    pub fn from_config(env: &EnvConfig) -> Result<Self, ConfigError> {
        let backend = HttpInferenceClient::new(env.backend.clone())?;
        Ok(Self::new(env.service_config()?, Arc::new(backend)))
    }

    pub fn queue(&self) -> &Arc<TranslationQueue> {
        &self.queue
    }

    pub fn tiers(&self) -> &TierTable {
        self.queue.tiers()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn workers_active(&self) -> usize {
        self.activity.count()
    }

    /// Launch `num_workers` batch workers. No-op while already running.
    pub async fn start(&self, num_workers: usize) {
        let mut slot = self.pool.lock().await;
        if slot.is_some() {
            warn!("translation_service_already_running");
            return;
        }

        let num_workers = num_workers.max(1);
        let mut pool = WorkerPool::new(self.activity.clone());
        for id in 0..num_workers {
            let collector = self.collector.clone();
            let metrics = self.metrics.clone();
            let backoff = self.error_backoff;
            pool.spawn(move |token| run_worker(id, collector, metrics, backoff, token));
        }
        *slot = Some(pool);
        self.running.store(true, Ordering::Release);
        info!(workers = num_workers, "translation_service_started");
    }

    /// Stop the workers, waiting up to `timeout` for in-flight batches, then
    /// fail every request still queued with `NotRunning`.
    pub async fn stop(&self, timeout: Duration) -> ShutdownResult {
        let mut slot = self.pool.lock().await;
        let Some(pool) = slot.take() else {
            return ShutdownResult::Complete;
        };
        self.running.store(false, Ordering::Release);

        let result = pool.shutdown(timeout).await;

        let pending = self.queue.drain().await;
        let abandoned = pending.len();
        for mut request in pending {
            let _ = request.resolve(Err(TranslationError::NotRunning));
        }
        info!(abandoned, result = ?result, "translation_service_stopped");
        result
    }

    /// Queue one text and wait up to `timeout` for its translation.
    pub async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        caller_id: &str,
        tier: Tier,
        timeout: Duration,
    ) -> Result<TranslationOutput, TranslationError> {
        if !self.is_running() {
            return Err(TranslationError::NotRunning);
        }

        let (request, rx) = TranslationRequest::new(text, source_lang, target_lang, caller_id, tier);
        let request_id = request.request_id.clone();
        let cancel = request.cancel_handle();

        if let Err(err) = self.queue.put(request).await {
            warn!(request_id = %request_id, tier = %tier, error = %err, "translation_rejected");
            return Err(err.into());
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TranslationError::Dropped { request_id }),
            Err(_) => {
                if self.cancel_on_timeout {
                    cancel.store(true, Ordering::Release);
                }
                let timeout_ms = timeout.as_millis() as u64;
                warn!(request_id = %request_id, tier = %tier, timeout_ms, "translation_timeout");
                Err(TranslationError::Timeout { timeout_ms })
            }
        }
    }

    /// Translate several texts concurrently. Results keep input order; the
    /// first failure in input order is returned. The texts are not
    /// guaranteed to share a backend batch.
    pub async fn translate_batch(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
        caller_id: &str,
        tier: Tier,
        timeout: Duration,
    ) -> Result<Vec<TranslationOutput>, TranslationError> {
        let calls = texts
            .iter()
            .map(|text| self.translate(text, source_lang, target_lang, caller_id, tier, timeout));
        futures::future::join_all(calls).await.into_iter().collect()
    }

    pub async fn health_check(&self) -> ServiceHealth {
        let backend = self.backend.health_check().await;
        self.health
            .report(self.is_running(), self.workers_active(), self.queue.len(), backend)
    }

    pub async fn metrics(&self) -> ServiceMetrics {
        ServiceMetrics {
            service: ServiceStatus {
                running: self.is_running(),
                workers_active: self.workers_active(),
            },
            queue: self.queue.metrics().await,
            batcher: self.collector.metrics(),
            processor: self.backend.metrics(),
            performance: self.metrics.summary(),
            sla: self.metrics.check_sla(),
        }
    }

    pub async fn reset_metrics(&self) {
        self.queue.reset_metrics().await;
        self.collector.reset_metrics();
        self.backend.reset_metrics();
        self.metrics.reset();
    }
}

impl Drop for TranslationService {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.get_mut().take() {
            pool.cancel();
        }
    }
}
