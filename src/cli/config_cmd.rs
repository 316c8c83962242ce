//! Config CLI subcommands: show, validate, tiers.
//!
//! These read configuration straight from the environment; nothing is
//! started.

use super::{EXIT_CONFIG, EXIT_FAILURE, EXIT_OK};
use crate::config::{self, EffectiveConfig, EnvConfig};

/// Print effective config as `KEY=value` lines.
pub fn run_show() {
    let cfg = config::load().effective_config();
    print_config(&cfg);
}

/// Print the tier table in effect as JSON.
pub fn run_tiers() -> i32 {
    match config::load().tiers() {
        Ok(table) => match serde_json::to_string_pretty(&tier_rows(&table)) {
            Ok(json) => {
                println!("{json}");
                EXIT_OK
            }
            Err(e) => {
                eprintln!("Failed to encode tier table: {e}");
                EXIT_FAILURE
            }
        },
        Err(e) => {
            eprintln!("ERROR: {e}");
            EXIT_CONFIG
        }
    }
}

fn tier_rows(table: &crate::tier::TierTable) -> serde_json::Value {
    let rows: serde_json::Map<String, serde_json::Value> = table
        .iter()
        .map(|(tier, cfg)| {
            let row = serde_json::json!({
                "priority": cfg.priority,
                "max_batch_size": cfg.max_batch_size,
                "min_batch_size": cfg.min_batch_size,
                "max_wait_ms": cfg.max_wait_ms,
                "target_latency_ms": cfg.target_latency_ms,
                "sla_threshold_ms": cfg.sla_threshold_ms(),
            });
            (tier.to_string(), row)
        })
        .collect();
    serde_json::Value::Object(rows)
}

/// Validate configuration.
///
/// Returns 0 if valid, 1 if there are warnings, 2 if the tier file is
/// missing or invalid.
pub fn run_validate() -> i32 {
    let env = config::load();
    if let Err(e) = env.tiers() {
        eprintln!("ERROR: {e}");
        return EXIT_CONFIG;
    }

    let warnings = collect_warnings(&env);
    for w in &warnings {
        eprintln!("WARNING: {w}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

fn collect_warnings(env: &EnvConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let url = &env.backend.base_url;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        warnings.push(format!("TIERBATCH_BACKEND_URL ({url}) is not an http(s) URL"));
    }
    if env.queue.boost_rate == 0.0 {
        warnings.push("TIERBATCH_BOOST_RATE is 0; low tiers can starve under load".to_string());
    }
    if env.request_timeout < env.batch.idle_timeout {
        warnings.push(format!(
            "TIERBATCH_REQUEST_TIMEOUT ({}s) is shorter than TIERBATCH_IDLE_TIMEOUT_MS ({}ms)",
            env.request_timeout.as_secs(),
            env.batch.idle_timeout.as_millis()
        ));
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("TIERBATCH_BACKEND_URL={}", cfg.backend_url);
    println!("TIERBATCH_API_KEY={}", if cfg.api_key_set { "<set>" } else { "<unset>" });
    println!("TIERBATCH_WORKERS={}", cfg.workers);
    println!("TIERBATCH_BACKEND_TIMEOUT={}", cfg.backend_timeout_secs);
    println!("TIERBATCH_MAX_RETRIES={}", cfg.max_retries);
    println!("TIERBATCH_BOOST_RATE={}", cfg.boost_rate);
    println!("TIERBATCH_IDLE_TIMEOUT_MS={}", cfg.idle_timeout_ms);
    println!("TIERBATCH_ADAPTIVE_SIZING={}", cfg.adaptive_sizing);
    println!("TIERBATCH_MAX_PENDING={}", cfg.max_pending.unwrap_or(0));
    println!("TIERBATCH_CANCEL_ON_TIMEOUT={}", cfg.cancel_on_timeout);
    println!("TIERBATCH_METRICS_WINDOW={}", cfg.metrics_window);
    println!("TIERBATCH_SHUTDOWN_TIMEOUT={}", cfg.shutdown_timeout_secs);
    println!("TIERBATCH_REQUEST_TIMEOUT={}", cfg.request_timeout_secs);
    println!(
        "TIERBATCH_TIER_FILE={}",
        cfg.tier_file.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
    );
    println!("TIERBATCH_LOG_LEVEL={}", cfg.log_level);
    println!("TIERBATCH_LOG_FORMAT={}", cfg.log_format);
}
