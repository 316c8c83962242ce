//! Span helpers for batch processing.

use tracing::{info_span, Span};

use crate::tier::Tier;

/// Records an operation's outcome on a span.
pub trait SpanExt {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for the per-batch span.
pub struct BatchSpan;

impl BatchSpan {
    /// `status`, `error.message` and `process_ms` are filled in after the
    /// backend call returns.
    pub fn new(tier: Tier, batch_size: usize, source_lang: &str, target_lang: &str) -> Span {
        info_span!(
            "translation_batch",
            tier = %tier,
            batch_size,
            source_lang = %source_lang,
            target_lang = %target_lang,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            process_ms = tracing::field::Empty,
        )
    }
}
