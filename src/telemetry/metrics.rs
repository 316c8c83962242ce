//! `metrics` facade export.
//!
//! The library only emits through the facade; installing a recorder and
//! exporter is left to the embedding application. Without one every call
//! below is a no-op.

use crate::error::TranslationError;
use crate::tier::Tier;

pub const QUEUE_DEPTH: &str = "tierbatch_queue_depth";
pub const REQUESTS_TOTAL: &str = "tierbatch_requests_total";
pub const REQUEST_LATENCY_MS: &str = "tierbatch_request_latency_ms";
pub const SLA_VIOLATIONS_TOTAL: &str = "tierbatch_sla_violations_total";
pub const BATCHES_TOTAL: &str = "tierbatch_batches_total";
pub const BATCH_SIZE: &str = "tierbatch_batch_size";
pub const BATCH_PROCESS_MS: &str = "tierbatch_batch_process_ms";
pub const BACKEND_ERRORS_TOTAL: &str = "tierbatch_backend_errors_total";
pub const BACKEND_RETRIES_TOTAL: &str = "tierbatch_backend_retries_total";

pub fn record_queue_depth(depth: usize) {
    metrics::gauge!(QUEUE_DEPTH).set(depth as f64);
}

/// One delivered request and whether it breached its tier's SLA threshold.
pub fn record_request_latency(tier: Tier, latency_ms: f64, sla_violated: bool) {
    metrics::counter!(REQUESTS_TOTAL, "tier" => tier.as_str()).increment(1);
    metrics::histogram!(REQUEST_LATENCY_MS, "tier" => tier.as_str()).record(latency_ms);
    if sla_violated {
        metrics::counter!(SLA_VIOLATIONS_TOTAL, "tier" => tier.as_str()).increment(1);
    }
}

pub fn record_batch_success(tier: Tier, batch_size: usize, process_ms: f64) {
    metrics::counter!(BATCHES_TOTAL, "tier" => tier.as_str(), "status" => "ok").increment(1);
    metrics::histogram!(BATCH_SIZE, "tier" => tier.as_str()).record(batch_size as f64);
    metrics::histogram!(BATCH_PROCESS_MS).record(process_ms);
}

pub fn record_batch_failure(tier: Tier, batch_size: usize) {
    metrics::counter!(BATCHES_TOTAL, "tier" => tier.as_str(), "status" => "error").increment(1);
    metrics::histogram!(BATCH_SIZE, "tier" => tier.as_str()).record(batch_size as f64);
}

pub fn record_backend_error(err: &TranslationError) {
    let kind = match err {
        TranslationError::Backend { retryable: true, .. } => "transient",
        TranslationError::Backend { retryable: false, .. } => "permanent",
        _ => "other",
    };
    metrics::counter!(BACKEND_ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_backend_retry() {
    metrics::counter!(BACKEND_RETRIES_TOTAL).increment(1);
}
