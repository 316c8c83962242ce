//! tierbatch-cli entry point.
//!
//! ## CLI Subcommands
//!
//! - `tierbatch-cli tiers` - Print the tier table in effect
//! - `tierbatch-cli config show|validate` - Inspect configuration
//! - `tierbatch-cli health` - Backend health check (exit 0/1)
//! - `tierbatch-cli translate ...` - Translate texts through a local service

use std::process::ExitCode;

use tierbatch::cli::{config_cmd, run_health, run_translate};
use tierbatch::config;
use tierbatch::telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "tiers" => ExitCode::from(config_cmd::run_tiers() as u8),
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_usage();
                    ExitCode::FAILURE
                }
            }
        }
        "health" => {
            setup_logging();
            ExitCode::from(run_health().await as u8)
        }
        "translate" => {
            setup_logging();
            ExitCode::from(run_translate(&args[2..]).await as u8)
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("tierbatch {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn setup_logging() {
    if let Err(e) = init_logging(&config::load().log) {
        eprintln!("Logging disabled: {}", e);
    }
}

fn print_usage() {
    eprintln!(
        "tierbatch {} - tier-aware translation batching

USAGE:
    tierbatch-cli <COMMAND> [OPTIONS]

COMMANDS:
    tiers            Print the tier table in effect (JSON)
    config show      Print effective configuration
    config validate  Validate configuration (exit 0 valid, 1 warnings, 2 error)
    health           Check backend health (exit 0 if healthy, 1 if not)
    translate        Translate texts through a local batching service
    version          Show version information
    help             Show this help message

TRANSLATE:
    tierbatch-cli translate --from LANG --to LANG [--tier TIER]
                            [--caller ID] [--timeout SECS] TEXT...

ENVIRONMENT:
    TIERBATCH_BACKEND_URL  Translation model service (default: http://localhost:8001)
    TIERBATCH_API_KEY      Sent as X-API-Key
    TIERBATCH_WORKERS      Batch worker count (default: 2)
    TIERBATCH_TIER_FILE    TOML tier policy overrides
    TIERBATCH_LOG_LEVEL    Log filter directive (default: info)

EXIT CODES:
    0  Success / Healthy
    1  Failure / Unhealthy
    2  Configuration error
",
        env!("CARGO_PKG_VERSION")
    );
}
