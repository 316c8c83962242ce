//! Tests for batch collection and processing.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::*;
use crate::backend::{BackendHealth, ClientMetricsSnapshot, InferenceBackend};
use crate::scheduler::queue::QueueConfig;
use crate::scheduler::request::ResultRx;
use crate::tier::TierTable;

/// Records every call and echoes `"<text>@<target>"`.
#[derive(Default)]
struct EchoBackend {
    calls: Mutex<Vec<(Vec<String>, String, String)>>,
    fail_with: Option<TranslationError>,
    short_by_one: bool,
}

#[async_trait::async_trait]
impl InferenceBackend for EchoBackend {
    async fn translate_batch(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<String>, TranslationError> {
        self.calls
            .lock()
            .push((texts.to_vec(), source_lang.to_string(), target_lang.to_string()));
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        let mut out: Vec<String> = texts.iter().map(|t| format!("{t}@{target_lang}")).collect();
        if self.short_by_one {
            out.pop();
        }
        Ok(out)
    }

    async fn health_check(&self) -> BackendHealth {
        BackendHealth { status: "healthy".into(), ..Default::default() }
    }

    fn metrics(&self) -> ClientMetricsSnapshot {
        ClientMetricsSnapshot::default()
    }

    fn reset_metrics(&self) {}
}

fn setup(tiers: TierTable, backend: EchoBackend) -> (Arc<TranslationQueue>, Arc<EchoBackend>, BatchCollector) {
    let queue = Arc::new(TranslationQueue::new(QueueConfig::default(), Arc::new(tiers)));
    let backend = Arc::new(backend);
    let collector = BatchCollector::new(queue.clone(), backend.clone(), BatchConfig::default());
    (queue, backend, collector)
}

async fn enqueue(queue: &TranslationQueue, text: &str, src: &str, tgt: &str, tier: Tier) -> ResultRx {
    let (request, rx) = TranslationRequest::new(text, src, tgt, "caller", tier);
    queue.put(request).await.unwrap();
    rx
}

/// Default table with FREE and BASIC allowed to ship a single request, so
/// the interruption check runs as soon as the first request is taken.
fn eager_tiers() -> TierTable {
    let defaults = TierTable::default();
    let mut free = *defaults.get(Tier::Free);
    free.min_batch_size = 1;
    let mut basic = *defaults.get(Tier::Basic);
    basic.min_batch_size = 1;
    TierTable::new(free, basic, *defaults.get(Tier::Pro), *defaults.get(Tier::Enterprise)).unwrap()
}

#[test]
fn adaptive_ceiling_follows_queue_depth() {
    let pro = *TierTable::default().get(Tier::Pro);
    assert_eq!(effective_max_batch_size(&pro, true, 0), 4);
    assert_eq!(effective_max_batch_size(&pro, true, 6), 7);
    assert_eq!(effective_max_batch_size(&pro, true, 100), 12);
    assert_eq!(effective_max_batch_size(&pro, false, 0), 12);
}

#[tokio::test(start_paused = true)]
async fn free_batch_respects_ceiling() {
    let (queue, _, collector) = setup(TierTable::default(), EchoBackend::default());
    for i in 0..50 {
        enqueue(&queue, &i.to_string(), "en", "zh", Tier::Free).await;
    }
    let batch = collector.collect_batch().await;
    assert_eq!(batch.len(), 32);
    assert_eq!(queue.len(), 18);
}

#[tokio::test(start_paused = true)]
async fn enterprise_batch_respects_ceiling() {
    let (queue, _, collector) = setup(TierTable::default(), EchoBackend::default());
    for i in 0..20 {
        enqueue(&queue, &i.to_string(), "en", "zh", Tier::Enterprise).await;
    }
    let batch = collector.collect_batch().await;
    assert_eq!(batch.len(), 8);
}

#[tokio::test(start_paused = true)]
async fn lone_request_ships_within_max_wait() {
    let (queue, _, collector) = setup(TierTable::default(), EchoBackend::default());
    enqueue(&queue, "solo", "en", "zh", Tier::Enterprise).await;

    let start = Instant::now();
    let batch = collector.collect_batch().await;
    let elapsed = start.elapsed();
    assert_eq!(batch.len(), 1);
    assert!(elapsed <= Duration::from_millis(25), "held for {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn empty_queue_yields_empty_batch_after_idle_timeout() {
    let (_, backend, collector) = setup(TierTable::default(), EchoBackend::default());
    let start = Instant::now();
    assert!(collector.collect_and_process().await.unwrap().is_none());
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(backend.calls.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn mixed_language_pairs_are_split() {
    let (queue, backend, collector) = setup(TierTable::default(), EchoBackend::default());
    for text in ["a", "b", "c"] {
        enqueue(&queue, text, "en", "zh", Tier::Basic).await;
    }
    enqueue(&queue, "d", "zh", "en", Tier::Basic).await;

    while !queue.is_empty() {
        collector.collect_and_process().await.unwrap();
    }

    let calls = backend.calls.lock();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], (vec!["a".into(), "b".into(), "c".into()], "en".into(), "zh".into()));
    assert_eq!(calls[1], (vec!["d".into()], "zh".into(), "en".into()));
    assert_eq!(collector.metrics().language_splits, 1);
}

#[tokio::test(start_paused = true)]
async fn results_map_back_to_their_requests() {
    let (queue, _, collector) = setup(TierTable::default(), EchoBackend::default());
    let mut receivers = Vec::new();
    for i in 0..5 {
        receivers.push((i, enqueue(&queue, &format!("t{i}"), "en", "de", Tier::Basic).await));
    }

    // Four more waiting behind the first lifts the adaptive ceiling to five.
    let result = collector.collect_and_process().await.unwrap().unwrap();
    assert_eq!(result.batch_size, 5);
    assert_eq!(result.tier_breakdown[&Tier::Basic], 5);

    for (i, rx) in receivers {
        let out = rx.await.unwrap().unwrap();
        assert_eq!(out.translation, format!("t{i}@de"));
        assert_eq!(out.target_lang, "de");
        assert_eq!(out.batch_size, 5);
    }
    let m = collector.metrics();
    assert_eq!(m.batches_processed, 1);
    assert_eq!(m.total_requests_processed, 5);
    assert_eq!(m.avg_batch_size, 5.0);
}

#[tokio::test(start_paused = true)]
async fn backend_failure_reaches_every_request() {
    let backend = EchoBackend {
        fail_with: Some(TranslationError::transient("backend returned status 503", Some(503))),
        ..Default::default()
    };
    let (queue, _, collector) = setup(TierTable::default(), backend);
    let mut receivers = Vec::new();
    for i in 0..3 {
        receivers.push(enqueue(&queue, &i.to_string(), "en", "zh", Tier::Pro).await);
    }

    let err = collector.collect_and_process().await.unwrap_err();
    assert!(matches!(err, BatchError::Inference { batch_size: 3, .. }));

    let mut errors = Vec::new();
    for rx in receivers {
        errors.push(rx.await.unwrap().unwrap_err());
    }
    assert!(errors.iter().all(|e| e == &errors[0]));
    assert!(errors[0].is_retryable());
    assert_eq!(collector.metrics().batches_failed, 1);
    assert_eq!(collector.metrics().batches_processed, 0);
}

#[tokio::test(start_paused = true)]
async fn short_backend_reply_fails_the_batch() {
    let backend = EchoBackend { short_by_one: true, ..Default::default() };
    let (queue, _, collector) = setup(TierTable::default(), backend);
    let rx = enqueue(&queue, "x", "en", "zh", Tier::Enterprise).await;
    enqueue(&queue, "y", "en", "zh", Tier::Enterprise).await;

    assert!(collector.collect_and_process().await.is_err());
    assert!(!rx.await.unwrap().unwrap_err().is_retryable());
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let (_, _, collector) = setup(TierTable::default(), EchoBackend::default());
    assert!(matches!(collector.process_batch(&[]).await, Err(BatchError::EmptyBatch)));
}

#[tokio::test(start_paused = true)]
async fn urgent_head_interrupts_collection() {
    let (queue, _, collector) = setup(eager_tiers(), EchoBackend::default());
    enqueue(&queue, "urgent", "en", "zh", Tier::Enterprise).await;
    let (first, _rx) = TranslationRequest::new("slow", "en", "zh", "caller", Tier::Free);

    let batch = collector.fill_batch(first).await;
    assert_eq!(batch.len(), 1);
    assert_eq!(queue.peek_tier().await, Some(Tier::Enterprise));
    assert_eq!(collector.metrics().priority_interruptions, 1);
}

#[tokio::test(start_paused = true)]
async fn one_level_gap_does_not_interrupt() {
    let (queue, _, collector) = setup(eager_tiers(), EchoBackend::default());
    enqueue(&queue, "next", "en", "zh", Tier::Pro).await;
    let (first, _rx) = TranslationRequest::new("current", "en", "zh", "caller", Tier::Basic);

    let batch = collector.fill_batch(first).await;
    assert_eq!(batch.len(), 2);
    assert_eq!(collector.metrics().priority_interruptions, 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_wait_for_first_request() {
    let (_, _, collector) = setup(TierTable::default(), EchoBackend::default());
    let token = CancellationToken::new();
    token.cancel();
    let start = Instant::now();
    assert!(collector.collect_batch_until(&token).await.is_empty());
    assert!(start.elapsed() < Duration::from_millis(1));
}

#[tokio::test(start_paused = true)]
async fn reset_clears_collector_counters() {
    let (queue, _, collector) = setup(TierTable::default(), EchoBackend::default());
    enqueue(&queue, "a", "en", "zh", Tier::Enterprise).await;
    collector.collect_and_process().await.unwrap();
    assert_eq!(collector.metrics().batches_processed, 1);
    collector.reset_metrics();
    assert_eq!(collector.metrics(), BatcherMetricsSnapshot::default());
}
