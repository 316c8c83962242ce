//! End-to-end tests for the translation service with an in-memory backend.

mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{fast_config, service_with, MockBackend};
use rand::Rng;
use tierbatch::health::{HealthConfig, HealthState};
use tierbatch::scheduler::{QueueConfig, ServiceConfig, TranslationRequest};
use tierbatch::shutdown::ShutdownResult;
use tierbatch::{Tier, TranslationError, TranslationService};

const WAIT: Duration = Duration::from_secs(10);

/// Start a single enterprise request so the only worker is busy inside the
/// backend for the backend's delay.
async fn occupy_worker(service: &Arc<TranslationService>) -> tokio::task::JoinHandle<Result<tierbatch::TranslationOutput, TranslationError>> {
    let svc = service.clone();
    let handle = tokio::spawn(async move {
        svc.translate("blocker", "en", "de", "t", Tier::Enterprise, WAIT).await
    });
    // Past the enterprise max wait, so the batch is in the backend.
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_translate_before_start_is_not_running() {
    let service = service_with(Arc::new(MockBackend::new()), fast_config());
    let err = service
        .translate("hello", "en", "de", "c1", Tier::Free, WAIT)
        .await
        .unwrap_err();
    assert_eq!(err, TranslationError::NotRunning);
    assert!(!err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent_and_stop_twice_is_harmless() {
    let service = service_with(Arc::new(MockBackend::new()), fast_config());
    service.start(2).await;
    service.start(4).await;
    assert!(service.is_running());
    assert_eq!(service.workers_active(), 2);

    assert_eq!(service.stop(Duration::from_secs(1)).await, ShutdownResult::Complete);
    assert_eq!(service.stop(Duration::from_secs(1)).await, ShutdownResult::Complete);
    assert!(!service.is_running());
    assert_eq!(service.workers_active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_fails_queued_requests_with_not_running() {
    let backend = Arc::new(MockBackend::with_delay(Duration::from_millis(400)));
    let service = Arc::new(service_with(backend.clone(), fast_config()));
    service.start(1).await;

    let in_flight = occupy_worker(&service).await;

    let (request, rx) = TranslationRequest::new("late", "en", "de", "c2", Tier::Free);
    service.queue().put(request).await.unwrap();

    assert_eq!(service.stop(Duration::from_secs(2)).await, ShutdownResult::Complete);
    assert_eq!(rx.await.unwrap(), Err(TranslationError::NotRunning));

    // The batch already in the backend still completes.
    let output = in_flight.await.unwrap().unwrap();
    assert_eq!(output.translation, "[de] blocker");
    assert_eq!(backend.texts_seen(), 1);

    let err = service
        .translate("after", "en", "de", "c3", Tier::Pro, WAIT)
        .await
        .unwrap_err();
    assert_eq!(err, TranslationError::NotRunning);
}

// ============================================================================
// Translation flow
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_basic_texts_are_batched_and_counted() {
    let backend = Arc::new(MockBackend::new());
    let service = service_with(backend.clone(), fast_config());
    service.start(2).await;

    let texts: Vec<String> = (0..5).map(|i| format!("sentence {i}")).collect();
    let outputs = service
        .translate_batch(&texts, "en", "fr", "c1", Tier::Basic, WAIT)
        .await
        .unwrap();

    assert_eq!(outputs.len(), 5);
    for (text, output) in texts.iter().zip(&outputs) {
        assert_eq!(output.translation, format!("[fr] {text}"));
        assert_eq!(output.source_lang, "en");
        assert_eq!(output.target_lang, "fr");
        assert!(output.batch_size >= 1);
    }

    let metrics = service.metrics().await;
    assert_eq!(metrics.queue.total_enqueued, 5);
    assert_eq!(metrics.queue.tier_distribution[&Tier::Basic], 5);
    assert!(metrics.batcher.batches_processed >= 1);
    assert_eq!(metrics.batcher.total_requests_processed, 5);
    assert_eq!(metrics.processor.total_requests, 5);
    assert!(metrics.service.running);

    service.stop(Duration::from_secs(1)).await;
    let metrics = service.metrics().await;
    assert_eq!(metrics.performance.total_requests, 5);
    assert!(metrics.sla.contains_key(&Tier::Basic));
}

#[tokio::test(start_paused = true)]
async fn test_every_request_resolved_exactly_once() {
    let backend = Arc::new(MockBackend::new());
    let service = Arc::new(service_with(backend.clone(), fast_config()));
    service.start(2).await;

    let mut rng = rand::thread_rng();
    let mut handles = Vec::new();
    for i in 0..100 {
        let tier = Tier::ALL[rng.gen_range(0..Tier::ALL.len())];
        let svc = service.clone();
        handles.push(tokio::spawn(async move {
            let text = format!("text-{i}");
            let output = svc.translate(&text, "en", "de", "load", tier, WAIT).await;
            (text, output)
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let (text, output) = handle.await.unwrap();
        let output = output.unwrap();
        assert_eq!(output.translation, format!("[de] {text}"));
        assert!(ids.insert(output.request_id));
    }
    assert_eq!(ids.len(), 100);
    assert_eq!(backend.texts_seen(), 100);

    let metrics = service.metrics().await;
    assert_eq!(metrics.queue.total_enqueued, 100);
    assert_eq!(metrics.queue.size, 0);
    service.stop(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_mixed_language_pairs_never_share_a_batch() {
    let backend = Arc::new(MockBackend::new());
    let service = Arc::new(service_with(backend.clone(), fast_config()));
    service.start(1).await;

    let mut handles = Vec::new();
    for i in 0..6 {
        let target = if i % 2 == 0 { "de" } else { "ja" };
        let svc = service.clone();
        handles.push(tokio::spawn(async move {
            svc.translate(&format!("t{i}"), "en", target, "c", Tier::Pro, WAIT).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for (texts, _, target) in backend.calls.lock().iter() {
        assert!(texts.iter().all(|t| {
            let i: usize = t[1..].parse().unwrap();
            (i % 2 == 0) == (target == "de")
        }));
    }
    service.stop(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_reaches_every_caller() {
    let backend = Arc::new(MockBackend::new());
    backend.fail.store(true, Ordering::Release);
    let service = service_with(backend.clone(), fast_config());
    service.start(1).await;

    let texts: Vec<String> = (0..3).map(|i| format!("x{i}")).collect();
    let err = service
        .translate_batch(&texts, "en", "de", "c", Tier::Enterprise, WAIT)
        .await
        .unwrap_err();
    assert!(matches!(err, TranslationError::Backend { retryable: false, .. }));

    backend.fail.store(false, Ordering::Release);
    let ok = service
        .translate("recovered", "en", "de", "c", Tier::Enterprise, WAIT)
        .await
        .unwrap();
    assert_eq!(ok.translation, "[de] recovered");

    let metrics = service.metrics().await;
    assert!(metrics.batcher.batches_failed >= 1);
    service.stop(Duration::from_secs(1)).await;
}

// ============================================================================
// Timeouts and admission
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_timeout_reports_configured_wait() {
    let backend = Arc::new(MockBackend::with_delay(Duration::from_millis(500)));
    let service = service_with(backend, fast_config());
    service.start(1).await;

    let err = service
        .translate("slow", "en", "de", "c", Tier::Enterprise, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err, TranslationError::Timeout { timeout_ms: 50 });
    assert!(err.is_retryable());
    service.stop(Duration::from_secs(2)).await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_on_timeout_skips_abandoned_request() {
    let backend = Arc::new(MockBackend::with_delay(Duration::from_millis(500)));
    let config = ServiceConfig { cancel_on_timeout: true, ..fast_config() };
    let service = Arc::new(service_with(backend.clone(), config));
    service.start(1).await;

    let in_flight = occupy_worker(&service).await;
    let err = service
        .translate("abandoned", "en", "de", "c", Tier::Free, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, TranslationError::Timeout { .. }));

    in_flight.await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(backend.texts_seen(), 1);
    assert_eq!(service.queue().metrics().await.total_cancelled, 1);
    service.stop(Duration::from_secs(2)).await;
}

#[tokio::test(start_paused = true)]
async fn test_queue_full_rejects_new_requests() {
    let backend = Arc::new(MockBackend::with_delay(Duration::from_secs(10)));
    let config = ServiceConfig {
        queue: QueueConfig { max_pending: Some(1), ..QueueConfig::default() },
        ..fast_config()
    };
    let service = Arc::new(service_with(backend, config));
    service.start(1).await;

    let _in_flight = occupy_worker(&service).await;

    let svc = service.clone();
    let queued = tokio::spawn(async move {
        svc.translate("waiting", "en", "de", "c", Tier::Free, WAIT).await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(service.queue().len(), 1);

    let err = service
        .translate("rejected", "en", "de", "c", Tier::Enterprise, WAIT)
        .await
        .unwrap_err();
    assert_eq!(err, TranslationError::QueueFull { max: 1 });
    assert_eq!(service.queue().metrics().await.total_rejected, 1);

    let result = service.stop(Duration::from_millis(100)).await;
    assert!(matches!(result, ShutdownResult::Timeout { .. }));
    assert_eq!(queued.await.unwrap(), Err(TranslationError::NotRunning));
}

// ============================================================================
// Health and metrics
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_health_states() {
    let backend = Arc::new(MockBackend::with_delay(Duration::from_secs(10)));
    let config = ServiceConfig {
        health: HealthConfig { max_queue_depth: 1 },
        ..fast_config()
    };
    let service = Arc::new(service_with(backend.clone(), config));

    let report = service.health_check().await;
    assert_eq!(report.state, HealthState::Unhealthy);
    assert!(!report.ready);

    service.start(1).await;
    let report = service.health_check().await;
    assert_eq!(report.state, HealthState::Healthy);
    assert!(report.ready);
    assert_eq!(report.workers_active, 1);

    let _in_flight = occupy_worker(&service).await;
    let (request, _rx) = TranslationRequest::new("queued", "en", "de", "c", Tier::Free);
    service.queue().put(request).await.unwrap();
    let report = service.health_check().await;
    assert_eq!(report.state, HealthState::Degraded);
    assert_eq!(report.queue_size, 1);
    assert!(!report.ready);

    backend.healthy.store(false, Ordering::Release);
    let report = service.health_check().await;
    assert_eq!(report.state, HealthState::Unhealthy);
    assert_eq!(report.backend.error.as_deref(), Some("mock backend down"));

    service.stop(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_metrics_zeroes_every_component() {
    let backend = Arc::new(MockBackend::new());
    let service = service_with(backend, fast_config());
    service.start(1).await;

    let texts: Vec<String> = vec!["a".into(), "b".into()];
    service
        .translate_batch(&texts, "en", "de", "c", Tier::Enterprise, WAIT)
        .await
        .unwrap();
    service.stop(Duration::from_secs(1)).await;

    service.reset_metrics().await;
    let metrics = service.metrics().await;
    assert_eq!(metrics.queue.total_enqueued, 0);
    assert_eq!(metrics.batcher.batches_processed, 0);
    assert_eq!(metrics.processor.total_requests, 0);
    assert_eq!(metrics.performance.total_requests, 0);
    assert_eq!(metrics.performance.total_batches, 0);
}

#[tokio::test]
async fn test_metrics_serialize_to_json() {
    let service = service_with(Arc::new(MockBackend::new()), fast_config());
    let json = serde_json::to_value(service.metrics().await).unwrap();
    assert_eq!(json["service"]["running"], false);
    assert!(json["queue"]["tier_distribution"].is_object());
    assert!(json["performance"]["latency_by_tier"].is_object());
}
