//! Request scheduling: the aging priority queue, tier-aware batch
//! collection, batch workers and the service that ties them together.

mod batch;
mod priority;
mod queue;
mod request;
mod service;
mod worker;

pub use batch::{
    effective_max_batch_size, BatchCollector, BatchConfig, BatchResult, BatcherMetrics,
    BatcherMetricsSnapshot,
};
pub use priority::{aging_score, AgingPriorityQueue, PrioritizedItem, DEFAULT_BOOST_RATE};
pub use queue::{QueueConfig, QueueMetrics, TranslationQueue};
pub use request::{
    LanguagePair, ResultRx, ResultSlot, TranslationOutput, TranslationRequest, TranslationResult,
};
pub use service::{ServiceConfig, ServiceMetrics, ServiceStatus, TranslationService};
pub use worker::{run_worker, DEFAULT_ERROR_BACKOFF};
