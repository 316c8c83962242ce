//! Shared test backends.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tierbatch::backend::{ClientMetrics, ClientMetricsSnapshot};
use tierbatch::scheduler::{BatchConfig, QueueConfig, ServiceConfig};
use tierbatch::{BackendHealth, InferenceBackend, TranslationError, TranslationService};

/// In-memory backend that prefixes every text with its target language.
pub struct MockBackend {
    pub calls: Mutex<Vec<(Vec<String>, String, String)>>,
    pub fail: AtomicBool,
    pub healthy: AtomicBool,
    pub delay: Duration,
    metrics: ClientMetrics,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            delay,
            metrics: ClientMetrics::new(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn texts_seen(&self) -> usize {
        self.calls.lock().iter().map(|(texts, _, _)| texts.len()).sum()
    }
}

#[async_trait::async_trait]
impl InferenceBackend for MockBackend {
    async fn translate_batch(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<String>, TranslationError> {
        let start = Instant::now();
        self.calls
            .lock()
            .push((texts.to_vec(), source_lang.to_string(), target_lang.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::Acquire) {
            self.metrics.record_error();
            return Err(TranslationError::permanent("model exploded", Some(500)));
        }
        self.metrics.record_success(texts.len(), texts.len() as u64, start.elapsed());
        Ok(texts.iter().map(|t| format!("[{target_lang}] {t}")).collect())
    }

    async fn health_check(&self) -> BackendHealth {
        if self.healthy.load(Ordering::Acquire) {
            BackendHealth { status: "healthy".into(), ..Default::default() }
        } else {
            BackendHealth::unhealthy("mock backend down")
        }
    }

    fn metrics(&self) -> ClientMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn reset_metrics(&self) {
        self.metrics.reset();
    }
}

/// Service config with a short idle timeout so stopped workers exit fast.
pub fn fast_config() -> ServiceConfig {
    ServiceConfig {
        queue: QueueConfig::default(),
        batch: BatchConfig {
            idle_timeout: Duration::from_millis(50),
            ..BatchConfig::default()
        },
        ..ServiceConfig::default()
    }
}

pub fn service_with(backend: Arc<MockBackend>, config: ServiceConfig) -> TranslationService {
    TranslationService::new(config, backend)
}
