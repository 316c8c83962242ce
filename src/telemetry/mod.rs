//! Telemetry: structured logging, batch spans, rolling performance
//! metrics and `metrics` facade export.

mod collector;
mod logging;
mod metrics;
mod spans;

pub use collector::{
    DistributionStats, LatencyStats, MetricsCollector, MetricsSummary, SlaStatus,
    DEFAULT_THROUGHPUT_WINDOW, DEFAULT_WINDOW_SIZE,
};
pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_backend_error, record_backend_retry, record_batch_failure, record_batch_success,
    record_queue_depth, record_request_latency,
};
pub use spans::{BatchSpan, SpanExt};
