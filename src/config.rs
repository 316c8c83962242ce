//! Runtime configuration loading from environment variables.
//!
//! All values come from `TIERBATCH_*` variables with sensible defaults.
//! Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TIERBATCH_BACKEND_URL` | http://localhost:8001 | Translation model service |
//! | `TIERBATCH_API_KEY` | (unset) | Sent as `X-API-Key` |
//! | `TIERBATCH_WORKERS` | 2 | Batch worker count |
//! | `TIERBATCH_BACKEND_TIMEOUT` | 30 | Backend request timeout (secs) |
//! | `TIERBATCH_MAX_RETRIES` | 2 | Retries on 5xx / transport errors |
//! | `TIERBATCH_BOOST_RATE` | 0.5 | Priority gained per second waited |
//! | `TIERBATCH_IDLE_TIMEOUT_MS` | 1000 | Wait for a batch's first request |
//! | `TIERBATCH_ADAPTIVE_SIZING` | true | Scale batch ceiling with queue depth |
//! | `TIERBATCH_MAX_PENDING` | 0 | Queue admission limit (0 = unbounded) |
//! | `TIERBATCH_CANCEL_ON_TIMEOUT` | false | Drop queued requests whose caller timed out |
//! | `TIERBATCH_METRICS_WINDOW` | 1000 | Rolling metrics window (samples) |
//! | `TIERBATCH_SHUTDOWN_TIMEOUT` | 5 | Worker drain grace period (secs) |
//! | `TIERBATCH_REQUEST_TIMEOUT` | 5 | Default caller wait (secs) |
//! | `TIERBATCH_TIER_FILE` | (unset) | TOML tier policy overrides |
//! | `TIERBATCH_LOG_LEVEL` | info | Log filter directive |
//! | `TIERBATCH_LOG_FORMAT` | json | `json` or `pretty` |

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::backend::HttpClientConfig;
use crate::error::ConfigError;
use crate::scheduler::{BatchConfig, QueueConfig, ServiceConfig, DEFAULT_BOOST_RATE};
use crate::telemetry::{LogConfig, LogFormat, DEFAULT_WINDOW_SIZE};
use crate::tier::TierTable;

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub backend_url: String,
    pub api_key_set: bool,
    pub workers: usize,
    pub backend_timeout_secs: u64,
    pub max_retries: u32,
    pub boost_rate: f64,
    pub idle_timeout_ms: u64,
    pub adaptive_sizing: bool,
    pub max_pending: Option<usize>,
    pub cancel_on_timeout: bool,
    pub metrics_window: usize,
    pub shutdown_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub tier_file: Option<PathBuf>,
    pub log_level: String,
    pub log_format: String,
}

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub backend: HttpClientConfig,
    pub workers: usize,
    pub queue: QueueConfig,
    pub batch: BatchConfig,
    pub cancel_on_timeout: bool,
    pub metrics_window: usize,
    pub shutdown_timeout: Duration,
    pub request_timeout: Duration,
    pub tier_file: Option<PathBuf>,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Finite, non-negative floats only.
fn parse_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn load_backend_config() -> HttpClientConfig {
    let defaults = HttpClientConfig::default();
    let timeout_secs = parse_u64("TIERBATCH_BACKEND_TIMEOUT", 30).max(1);
    let max_retries = parse_u32("TIERBATCH_MAX_RETRIES", 2).min(10);
    HttpClientConfig {
        base_url: non_empty("TIERBATCH_BACKEND_URL").unwrap_or(defaults.base_url),
        api_key: non_empty("TIERBATCH_API_KEY"),
        timeout: Duration::from_secs(timeout_secs),
        max_retries,
        retry_base_delay: defaults.retry_base_delay,
    }
}

fn load_queue_config() -> QueueConfig {
    let boost_rate = parse_f64("TIERBATCH_BOOST_RATE", DEFAULT_BOOST_RATE);
    let max_pending = match parse_usize("TIERBATCH_MAX_PENDING", 0) {
        0 => None,
        n => Some(n),
    };
    QueueConfig { boost_rate, max_pending }
}

fn load_batch_config() -> BatchConfig {
    let idle_ms = parse_u64("TIERBATCH_IDLE_TIMEOUT_MS", 1000).clamp(10, 60_000);
    BatchConfig {
        adaptive_sizing: parse_bool("TIERBATCH_ADAPTIVE_SIZING", true),
        idle_timeout: Duration::from_millis(idle_ms),
        ..BatchConfig::default()
    }
}

fn load_log_config() -> LogConfig {
    let format = non_empty("TIERBATCH_LOG_FORMAT")
        .and_then(|f| f.parse::<LogFormat>().ok())
        .unwrap_or_default();
    LogConfig {
        format,
        level: non_empty("TIERBATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        output_path: None,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let workers = parse_usize("TIERBATCH_WORKERS", 2).clamp(1, 64);
    let metrics_window = parse_usize("TIERBATCH_METRICS_WINDOW", DEFAULT_WINDOW_SIZE).max(1);
    let shutdown_secs = parse_u64("TIERBATCH_SHUTDOWN_TIMEOUT", 5).max(1);
    let request_secs = parse_u64("TIERBATCH_REQUEST_TIMEOUT", 5).max(1);

    EnvConfig {
        backend: load_backend_config(),
        workers,
        queue: load_queue_config(),
        batch: load_batch_config(),
        cancel_on_timeout: parse_bool("TIERBATCH_CANCEL_ON_TIMEOUT", false),
        metrics_window,
        shutdown_timeout: Duration::from_secs(shutdown_secs),
        request_timeout: Duration::from_secs(request_secs),
        tier_file: non_empty("TIERBATCH_TIER_FILE").map(PathBuf::from),
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Tier table from `TIERBATCH_TIER_FILE`, or the defaults.
    pub fn tiers(&self) -> Result<TierTable, ConfigError> {
        match &self.tier_file {
            Some(path) => TierTable::from_toml_file(path),
            None => Ok(TierTable::default()),
        }
    }

    /// Service configuration, loading the tier file if one is set.
    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        Ok(ServiceConfig {
            tiers: self.tiers()?,
            queue: self.queue.clone(),
            batch: self.batch.clone(),
            metrics_window: self.metrics_window,
            cancel_on_timeout: self.cancel_on_timeout,
            ..ServiceConfig::default()
        })
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            backend_url: self.backend.base_url.clone(),
            api_key_set: self.backend.api_key.is_some(),
            workers: self.workers,
            backend_timeout_secs: self.backend.timeout.as_secs(),
            max_retries: self.backend.max_retries,
            boost_rate: self.queue.boost_rate,
            idle_timeout_ms: self.batch.idle_timeout.as_millis() as u64,
            adaptive_sizing: self.batch.adaptive_sizing,
            max_pending: self.queue.max_pending,
            cancel_on_timeout: self.cancel_on_timeout,
            metrics_window: self.metrics_window,
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            request_timeout_secs: self.request_timeout.as_secs(),
            tier_file: self.tier_file.clone(),
            log_level: self.log.level.clone(),
            log_format: match self.log.format {
                LogFormat::Json => "json".to_string(),
                LogFormat::Pretty => "pretty".to_string(),
            },
        }
    }
}
