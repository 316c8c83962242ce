//! Translation request and its single-assignment result slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::TranslationError;
use crate::tier::{Tier, TierTable};
use super::priority::aging_score;

/// What a successful caller receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationOutput {
    pub translation: String,
    pub source_lang: String,
    pub target_lang: String,
    /// Enqueue-to-completion latency of the batch this request rode in.
    pub latency_ms: f64,
    pub batch_size: usize,
    pub request_id: String,
}

pub type TranslationResult = Result<TranslationOutput, TranslationError>;

/// Receiver half held by the caller.
pub type ResultRx = oneshot::Receiver<TranslationResult>;

/// Write-once delivery slot for one request.
#[derive(Debug)]
pub struct ResultSlot {
    tx: Option<oneshot::Sender<TranslationResult>>,
}

impl ResultSlot {
    pub fn channel() -> (Self, ResultRx) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Deliver the result. A second call is a programming error and is
    /// reported instead of silently overwriting.
    pub fn resolve(&mut self, request_id: &str, result: TranslationResult) -> Result<(), TranslationError> {
        match self.tx.take() {
            Some(tx) => {
                // The caller may have timed out and dropped its receiver.
                let _ = tx.send(result);
                Ok(())
            }
            None => {
                debug_assert!(false, "result slot for {request_id} resolved twice");
                Err(TranslationError::AlreadyResolved { request_id: request_id.to_string() })
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.is_none()
    }

    /// Whether the caller is still waiting.
    pub fn is_abandoned(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

/// Source/target language codes of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

/// One caller's unit of work, owned by the queue while pending and by a
/// batch collector once dequeued.
#[derive(Debug)]
pub struct TranslationRequest {
    pub request_id: String,
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub caller_id: String,
    pub tier: Tier,
    pub enqueued_at: Instant,
    slot: ResultSlot,
    cancelled: Arc<AtomicBool>,
}

impl TranslationRequest {
    /// Create a request and the receiver its caller waits on.
    pub fn new(
        text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        caller_id: impl Into<String>,
        tier: Tier,
    ) -> (Self, ResultRx) {
        let (slot, rx) = ResultSlot::channel();
        let request = Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            caller_id: caller_id.into(),
            tier,
            enqueued_at: Instant::now(),
            slot,
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        (request, rx)
    }

    /// Override the enqueue instant. Used for replaying aged requests.
    pub fn with_enqueued_at(mut self, at: Instant) -> Self {
        self.enqueued_at = at;
        self
    }

    pub fn language_pair(&self) -> LanguagePair {
        LanguagePair {
            source: self.source_lang.clone(),
            target: self.target_lang.clone(),
        }
    }

    pub fn same_pair(&self, other: &TranslationRequest) -> bool {
        self.source_lang == other.source_lang && self.target_lang == other.target_lang
    }

    /// Current dynamic score; lower is served first.
    pub fn score(&self, tiers: &TierTable, boost_rate: f64, now: Instant) -> f64 {
        let base = tiers.get(self.tier).priority as f64;
        aging_score(base, now.saturating_duration_since(self.enqueued_at), boost_rate)
    }

    pub fn wait_time(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    pub fn resolve(&mut self, result: TranslationResult) -> Result<(), TranslationError> {
        self.slot.resolve(&self.request_id, result)
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.is_resolved()
    }

    pub fn is_abandoned(&self) -> bool {
        self.slot.is_abandoned()
    }

    /// Check if the caller gave up and asked for the request to be dropped.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Mark the request as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Shared cancellation flag, kept by the caller after the request is queued.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(id: &str) -> TranslationOutput {
        TranslationOutput {
            translation: "hola".into(),
            source_lang: "en".into(),
            target_lang: "es".into(),
            latency_ms: 1.0,
            batch_size: 1,
            request_id: id.into(),
        }
    }

    #[tokio::test]
    async fn resolve_delivers_to_receiver() {
        let (mut req, rx) = TranslationRequest::new("hello", "en", "es", "u1", Tier::Pro);
        let id = req.request_id.clone();
        req.resolve(Ok(output(&id))).unwrap();
        assert!(req.is_resolved());
        assert_eq!(rx.await.unwrap().unwrap().request_id, id);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn second_resolve_is_rejected() {
        let (mut req, _rx) = TranslationRequest::new("hello", "en", "es", "u1", Tier::Pro);
        req.resolve(Err(TranslationError::NotRunning)).unwrap();
        let err = req.resolve(Err(TranslationError::NotRunning)).unwrap_err();
        assert!(matches!(err, TranslationError::AlreadyResolved { .. }));
    }

    #[test]
    #[should_panic(expected = "resolved twice")]
    #[cfg(debug_assertions)]
    fn second_resolve_panics_in_debug() {
        let (mut req, _rx) = TranslationRequest::new("hello", "en", "es", "u1", Tier::Pro);
        let _ = req.resolve(Err(TranslationError::NotRunning));
        let _ = req.resolve(Err(TranslationError::NotRunning));
    }

    #[test]
    fn resolve_after_caller_dropped_is_ok() {
        let (mut req, rx) = TranslationRequest::new("hello", "en", "es", "u1", Tier::Free);
        drop(rx);
        assert!(req.is_abandoned());
        assert!(req.resolve(Err(TranslationError::NotRunning)).is_ok());
    }

    #[test]
    fn request_ids_are_unique() {
        let (a, _) = TranslationRequest::new("a", "en", "zh", "u", Tier::Free);
        let (b, _) = TranslationRequest::new("a", "en", "zh", "u", Tier::Free);
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn language_pair_comparison() {
        let (a, _) = TranslationRequest::new("a", "en", "zh", "u", Tier::Free);
        let (b, _) = TranslationRequest::new("b", "en", "zh", "u", Tier::Pro);
        let (c, _) = TranslationRequest::new("c", "zh", "en", "u", Tier::Free);
        assert!(a.same_pair(&b));
        assert!(!a.same_pair(&c));
    }

    #[test]
    fn cancel_flag_is_shared() {
        let (req, _) = TranslationRequest::new("a", "en", "zh", "u", Tier::Free);
        let handle = req.cancel_handle();
        handle.store(true, Ordering::Release);
        assert!(req.is_cancelled());
    }
}
