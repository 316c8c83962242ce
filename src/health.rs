//! Service health evaluation.
//!
//! Combines the lifecycle state, worker count, queue depth and the backend's
//! own report into a single `HealthState`.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::backend::BackendHealth;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Full service health report.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub state: HealthState,
    pub running: bool,
    /// Accepting new work without being saturated.
    pub ready: bool,
    pub workers_active: usize,
    pub queue_size: usize,
    pub uptime_secs: u64,
    pub backend: BackendHealth,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Queue depth at or above which the service reports `Degraded`.
    pub max_queue_depth: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { max_queue_depth: 1000 }
    }
}

pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    pub fn is_ready(&self, running: bool, workers_active: usize, queue: usize) -> bool {
        running && workers_active > 0 && queue < self.config.max_queue_depth
    }

    pub fn report(
        &self,
        running: bool,
        workers_active: usize,
        queue: usize,
        backend: BackendHealth,
    ) -> ServiceHealth {
        ServiceHealth {
            state: self.compute_state(running, workers_active, queue, &backend),
            running,
            ready: self.is_ready(running, workers_active, queue),
            workers_active,
            queue_size: queue,
            uptime_secs: self.start_time.elapsed().as_secs(),
            backend,
        }
    }

    fn compute_state(
        &self,
        running: bool,
        workers_active: usize,
        queue: usize,
        backend: &BackendHealth,
    ) -> HealthState {
        if !running || !backend.is_healthy() {
            return HealthState::Unhealthy;
        }
        if workers_active == 0 || queue >= self.config.max_queue_depth {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
