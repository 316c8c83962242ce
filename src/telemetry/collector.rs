//! Rolling-window performance metrics.
//!
//! Latency, batch size and queue depth samples are kept in bounded windows.
//! Readers copy the window under the lock and compute outside it, so
//! producers are never blocked behind a percentile calculation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::tier::{Tier, TierTable};

pub const DEFAULT_WINDOW_SIZE: usize = 1000;
pub const DEFAULT_THROUGHPUT_WINDOW: Duration = Duration::from_secs(60);

/// Latency percentiles for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// Summary of a window of integer samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DistributionStats {
    pub avg: f64,
    pub min: usize,
    pub max: usize,
    pub count: usize,
}

/// SLA compliance of one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaStatus {
    pub tier: Tier,
    pub target_ms: u64,
    pub actual_p95_ms: f64,
    pub sla_met: bool,
    pub sample_count: usize,
    pub violation_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub total_batches: u64,
    pub failed_batches: u64,
    pub throughput_per_second: f64,
    pub batch_sizes: DistributionStats,
    pub queue_depth: DistributionStats,
    /// Tiers with at least one sample.
    pub latency_by_tier: BTreeMap<Tier, LatencyStats>,
    /// Tiers with at least one sample.
    pub sla_status: BTreeMap<Tier, SlaStatus>,
}

#[derive(Default)]
struct Windows {
    latencies: HashMap<Tier, VecDeque<f64>>,
    batch_sizes: VecDeque<usize>,
    queue_depths: VecDeque<usize>,
    request_times: VecDeque<Instant>,
    sla_violations: HashMap<Tier, u64>,
    total_requests: u64,
    total_batches: u64,
    failed_batches: u64,
}

fn push_bounded<T>(window: &mut VecDeque<T>, value: T, cap: usize) {
    window.push_back(value);
    while window.len() > cap {
        window.pop_front();
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregates per-request and per-batch observations.
pub struct MetricsCollector {
    window_size: usize,
    tiers: Arc<TierTable>,
    state: Mutex<Windows>,
}

impl MetricsCollector {
    pub fn new(window_size: usize, tiers: Arc<TierTable>) -> Self {
        Self {
            window_size: window_size.max(1),
            tiers,
            state: Mutex::new(Windows::default()),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Record one completed request.
    pub fn record_request(&self, tier: Tier, latency_ms: f64, batch_size: usize, queue_depth: usize) {
        let threshold = self.tiers.get(tier).sla_threshold_ms();
        let violated = latency_ms > threshold;
        let cap = self.window_size;
        {
            let mut state = self.state.lock();
            push_bounded(state.latencies.entry(tier).or_default(), latency_ms, cap);
            if violated {
                *state.sla_violations.entry(tier).or_insert(0) += 1;
            }
            push_bounded(&mut state.batch_sizes, batch_size, cap);
            push_bounded(&mut state.queue_depths, queue_depth, cap);
            push_bounded(&mut state.request_times, Instant::now(), cap);
            state.total_requests += 1;
        }
        super::metrics::record_request_latency(tier, latency_ms, violated);
    }

    pub fn record_batch(&self, _batch_size: usize) {
        self.state.lock().total_batches += 1;
    }

    pub fn record_failed_batch(&self, _batch_size: usize) {
        self.state.lock().failed_batches += 1;
    }

    pub fn latency_by_tier(&self, tier: Tier) -> LatencyStats {
        let mut samples: Vec<f64> = {
            let state = self.state.lock();
            match state.latencies.get(&tier) {
                Some(window) => window.iter().copied().collect(),
                None => return LatencyStats::default(),
            }
        };
        latency_stats(&mut samples)
    }

    pub fn batch_size_stats(&self) -> DistributionStats {
        let samples: Vec<usize> = self.state.lock().batch_sizes.iter().copied().collect();
        distribution(&samples)
    }

    pub fn queue_depth_stats(&self) -> DistributionStats {
        let samples: Vec<usize> = self.state.lock().queue_depths.iter().copied().collect();
        distribution(&samples)
    }

    /// Requests per second over the trailing `window`.
    pub fn throughput(&self, window: Duration) -> f64 {
        let now = Instant::now();
        let recent: Vec<Instant> = {
            let state = self.state.lock();
            state
                .request_times
                .iter()
                .copied()
                .filter(|t| now.saturating_duration_since(*t) < window)
                .collect()
        };
        let (Some(first), Some(last)) = (recent.first(), recent.last()) else {
            return 0.0;
        };
        if recent.len() < 2 {
            return 0.0;
        }
        let span = last.saturating_duration_since(*first).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        round2(recent.len() as f64 / span)
    }

    /// SLA status of every tier. A tier without samples counts as met.
    pub fn check_sla(&self) -> BTreeMap<Tier, SlaStatus> {
        let violations = self.state.lock().sla_violations.clone();
        Tier::ALL
            .into_iter()
            .map(|tier| {
                let config = self.tiers.get(tier);
                let stats = self.latency_by_tier(tier);
                let sla_met = stats.count == 0 || stats.p95 <= config.sla_threshold_ms();
                let status = SlaStatus {
                    tier,
                    target_ms: config.target_latency_ms,
                    actual_p95_ms: round2(stats.p95),
                    sla_met,
                    sample_count: stats.count,
                    violation_count: violations.get(&tier).copied().unwrap_or(0),
                };
                (tier, status)
            })
            .collect()
    }

    pub fn summary(&self) -> MetricsSummary {
        let (total_requests, total_batches, failed_batches) = {
            let state = self.state.lock();
            (state.total_requests, state.total_batches, state.failed_batches)
        };

        let latency_by_tier = Tier::ALL
            .into_iter()
            .map(|tier| (tier, self.latency_by_tier(tier)))
            .filter(|(_, stats)| stats.count > 0)
            .map(|(tier, s)| {
                let rounded = LatencyStats {
                    p50: round2(s.p50),
                    p95: round2(s.p95),
                    p99: round2(s.p99),
                    avg: round2(s.avg),
                    ..s
                };
                (tier, rounded)
            })
            .collect();

        let sla_status = self
            .check_sla()
            .into_iter()
            .filter(|(_, status)| status.sample_count > 0)
            .collect();

        MetricsSummary {
            total_requests,
            total_batches,
            failed_batches,
            throughput_per_second: self.throughput(DEFAULT_THROUGHPUT_WINDOW),
            batch_sizes: self.batch_size_stats(),
            queue_depth: self.queue_depth_stats(),
            latency_by_tier,
            sla_status,
        }
    }

    pub fn reset(&self) {
        *self.state.lock() = Windows::default();
    }
}

fn latency_stats(samples: &mut [f64]) -> LatencyStats {
    if samples.is_empty() {
        return LatencyStats::default();
    }
    samples.sort_by(|a, b| a.total_cmp(b));
    let n = samples.len();
    let max = samples[n - 1];
    let at = |q: f64| samples[((n as f64 * q) as usize).min(n - 1)];

    LatencyStats {
        p50: at(0.50),
        p95: if n >= 20 { at(0.95) } else { max },
        p99: if n >= 100 { at(0.99) } else { max },
        avg: samples.iter().sum::<f64>() / n as f64,
        min: samples[0],
        max,
        count: n,
    }
}

fn distribution(samples: &[usize]) -> DistributionStats {
    if samples.is_empty() {
        return DistributionStats::default();
    }
    let sum: usize = samples.iter().sum();
    DistributionStats {
        avg: round2(sum as f64 / samples.len() as f64),
        min: samples.iter().copied().min().unwrap_or(0),
        max: samples.iter().copied().max().unwrap_or(0),
        count: samples.len(),
    }
}
